use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    time::Duration,
};

#[cfg(unix)]
use std::os::unix::net::UnixDatagram;

use super::{Endpoint, RemoteAddr};

pub(crate) const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Sends a single payload to a remote address.
///
/// Implementations must not hold on to any connection state between calls: every call stands on its own.
pub trait Transport {
    /// Sends `payload` as a single datagram to `remote`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// If the remote address cannot be resolved or connected to, or the write fails or times out, an error is
    /// returned.
    fn send(&self, remote: &RemoteAddr, payload: &[u8]) -> io::Result<usize>;
}

impl<T> Transport for &T
where
    T: Transport + ?Sized,
{
    fn send(&self, remote: &RemoteAddr, payload: &[u8]) -> io::Result<usize> {
        (**self).send(remote, payload)
    }
}

enum Client {
    Udp(UdpSocket),

    #[cfg(unix)]
    Unixgram(UnixDatagram),
}

impl Client {
    fn connect(remote: &RemoteAddr, write_timeout: Duration) -> io::Result<Self> {
        match remote {
            RemoteAddr::Udp(endpoint) => {
                let addr = resolve(endpoint)?;
                let local: SocketAddr = if addr.is_ipv4() {
                    (Ipv4Addr::UNSPECIFIED, 0).into()
                } else {
                    (Ipv6Addr::UNSPECIFIED, 0).into()
                };

                UdpSocket::bind(local).and_then(|socket| {
                    socket.connect(addr)?;
                    socket.set_write_timeout(Some(write_timeout))?;
                    Ok(Client::Udp(socket))
                })
            }

            #[cfg(unix)]
            RemoteAddr::Unixgram(path) => UnixDatagram::unbound().and_then(|socket| {
                socket.connect(path)?;
                socket.set_write_timeout(Some(write_timeout))?;
                Ok(Client::Unixgram(socket))
            }),
        }
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Client::Udp(socket) => socket.send(buf),

            #[cfg(unix)]
            Client::Unixgram(socket) => socket.send(buf),
        }
    }
}

fn resolve(endpoint: &Endpoint) -> io::Result<SocketAddr> {
    // IP literals never go through the system resolver.
    if let Ok(ip) = endpoint.host().parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, endpoint.port()));
    }

    (endpoint.host(), endpoint.port()).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for '{}'", endpoint.host()),
        )
    })
}

/// Best-effort datagram transport.
///
/// A fresh socket is opened for every payload and closed as soon as the write returns. Nothing is pooled or reused
/// across calls.
///
/// Host names are resolved on every send, through the system resolver. The write timeout does not bound that lookup:
/// a slow resolver delays the send by however long it takes to answer. IP addresses skip resolution entirely, so
/// configuring the collector by address keeps every send bounded by the write timeout.
#[derive(Clone, Debug)]
pub struct DatagramTransport {
    write_timeout: Duration,
}

impl DatagramTransport {
    /// Creates a new `DatagramTransport` with the given write timeout.
    pub const fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }

    /// Returns the write timeout applied to every send.
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

impl Default for DatagramTransport {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_TIMEOUT)
    }
}

impl Transport for DatagramTransport {
    fn send(&self, remote: &RemoteAddr, payload: &[u8]) -> io::Result<usize> {
        let client = Client::connect(remote, self.write_timeout)?;
        let written = client.send(payload)?;

        // `client` is dropped here, closing the socket.
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{SocketAddr, UdpSocket};

    use super::{resolve, DatagramTransport, Transport as _};
    use crate::forwarder::{Endpoint, RemoteAddr};

    #[test]
    fn udp_send_is_single_datagram() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();
        let remote = RemoteAddr::Udp(Endpoint::new("127.0.0.1", port).unwrap());

        let transport = DatagramTransport::default();
        assert_eq!(transport.send(&remote, b"requests:1|c").unwrap(), 12);
        assert_eq!(transport.send(&remote, b"items:7|c|#env:sandbox").unwrap(), 22);

        let mut buf = [0u8; 64];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"requests:1|c");
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"items:7|c|#env:sandbox");
    }

    #[test]
    fn ip_literals_resolve_to_themselves() {
        let addr = resolve(&Endpoint::new("10.0.3.17", 8125).unwrap()).unwrap();
        assert_eq!(addr, "10.0.3.17:8125".parse::<SocketAddr>().unwrap());

        let addr = resolve(&Endpoint::new("::1", 9125).unwrap()).unwrap();
        assert_eq!(addr, "[::1]:9125".parse::<SocketAddr>().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn missing_socket_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let remote = RemoteAddr::Unixgram(dir.path().join("missing.sock"));

        let transport = DatagramTransport::default();
        assert!(transport.send(&remote, b"requests:1|c").is_err());
    }
}
