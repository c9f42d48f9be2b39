use std::fmt;

#[cfg(unix)]
use std::path::PathBuf;

pub mod sync;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8125;

/// A DogStatsD collector reachable over UDP.
///
/// The host is kept as given, and is only resolved when a payload is actually sent, so building an `Endpoint` never
/// performs any I/O.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates a new `Endpoint`.
    ///
    /// Returns `None` if the host is empty or the port is zero.
    pub fn new<H>(host: H, port: u16) -> Option<Self>
    where
        H: Into<String>,
    {
        let host = host.into();
        if host.is_empty() || port == 0 {
            return None;
        }

        Some(Self { host, port })
    }

    /// Returns the host name or IP address of the collector.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the UDP port of the collector.
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Default for Endpoint {
    /// The default DogStatsD listener of a local Datadog Agent: `127.0.0.1:8125`.
    fn default() -> Self {
        Self { host: DEFAULT_HOST.to_owned(), port: DEFAULT_PORT }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Address of the collector that payloads are sent to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteAddr {
    /// A UDP endpoint.
    Udp(Endpoint),

    /// A Unix domain socket in `SOCK_DGRAM` mode.
    #[cfg(unix)]
    Unixgram(PathBuf),
}

impl RemoteAddr {
    /// Returns the transport ID for the remote address.
    ///
    /// This is a simple acronym related to the transport that will be used for the remote address, such as `udp` for
    /// UDP, and so on.
    pub const fn transport_id(&self) -> &'static str {
        match self {
            RemoteAddr::Udp(_) => "udp",
            #[cfg(unix)]
            RemoteAddr::Unixgram(_) => "uds",
        }
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAddr::Udp(endpoint) => endpoint.fmt(f),
            #[cfg(unix)]
            RemoteAddr::Unixgram(path) => write!(f, "unixgram://{}", path.display()),
        }
    }
}

impl From<Endpoint> for RemoteAddr {
    fn from(endpoint: Endpoint) -> Self {
        RemoteAddr::Udp(endpoint)
    }
}

impl<'a> TryFrom<&'a str> for RemoteAddr {
    type Error = String;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        if let Some((scheme, path)) = addr.split_once("://") {
            return match scheme {
                #[cfg(unix)]
                "unixgram" if !path.is_empty() => Ok(RemoteAddr::Unixgram(PathBuf::from(path))),
                #[cfg(unix)]
                "unixgram" => Err("missing socket path".to_string()),
                _ => Err(format!("invalid scheme '{}' (expected 'unixgram')", scheme)),
            };
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("'{}' is not in the form <host>:<port>", addr))?;

        // Bracketed IPv6 literals, such as `[::1]:8125`.
        let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);

        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port '{}': {}", port, e))?;

        Endpoint::new(host, port)
            .map(RemoteAddr::Udp)
            .ok_or_else(|| format!("'{}' must have a non-empty host and a port between 1 and 65535", addr))
    }
}
