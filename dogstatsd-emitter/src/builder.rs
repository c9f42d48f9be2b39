use std::time::Duration;

#[cfg(unix)]
use std::path::PathBuf;

use thiserror::Error;

use crate::{
    driver::Driver,
    emitter::{EmitError, MetricEmitter},
    forwarder::{
        sync::{DatagramTransport, DEFAULT_WRITE_TIMEOUT},
        Endpoint, RemoteAddr,
    },
    writer::MetricSample,
};

pub(crate) const DEFAULT_SERVICE: &str = "dogstatsd-emitter";
const DEFAULT_INTERVAL_SECS: f64 = 10.0;

const ENV_AGENT_HOST: &str = "DD_AGENT_HOST";
const ENV_DOGSTATSD_PORT: &str = "DD_DOGSTATSD_PORT";
const ENV_DOGSTATSD_SOCKET: &str = "DD_DOGSTATSD_SOCKET";
const ENV_SERVICE: &str = "DD_SERVICE";
const ENV_INTERVAL_SECS: &str = "DD_EMITTER_INTERVAL_SECS";

/// Errors that could occur while configuring or building an emitter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The collector port was not a number between 1 and 65535.
    #[error("invalid collector port '{value}' (expected a number between 1 and 65535)")]
    InvalidPort {
        /// The port as it was configured.
        value: String,
    },

    /// Neither a host/port pair nor a socket path could be resolved.
    #[error("no collector endpoint configured: set a host and port, or a socket path")]
    MissingEndpoint,

    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The sample interval was not a number.
    #[error("invalid sample interval '{value}' (expected a number of seconds)")]
    InvalidInterval {
        /// The interval as it was configured.
        value: String,
    },

    /// The configured transport is not available on this platform.
    #[error("unsupported transport: {reason}")]
    UnsupportedTransport {
        /// Details about what was configured.
        reason: String,
    },

    /// A fan-out destination was added twice.
    #[error("duplicate destination '{id}'")]
    DuplicateDestination {
        /// The destination ID.
        id: String,
    },

    /// The driver could not be created.
    #[error("failed to create driver: {0}")]
    Driver(#[source] EmitError),
}

/// Builder for a [`MetricEmitter`], and the [`Driver`] that runs it.
#[derive(Clone, Debug)]
pub struct EmitterBuilder {
    remote_addr: RemoteAddr,
    write_timeout: Duration,
    service: String,
    interval_secs: f64,
}

impl EmitterBuilder {
    /// Creates a builder from the process environment.
    ///
    /// See [`from_lookup`][Self::from_lookup] for the variables that are read.
    ///
    /// # Errors
    ///
    /// If any variable is set to an invalid value, an error will be returned.
    pub fn from_env() -> Result<Self, BuildError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a builder, reading its configuration through `lookup`.
    ///
    /// The following variables are read:
    ///
    /// - `DD_AGENT_HOST`: collector host. Defaults to `127.0.0.1`.
    /// - `DD_DOGSTATSD_PORT`: collector UDP port. Defaults to `8125`.
    /// - `DD_DOGSTATSD_SOCKET`: path to the collector's Unix domain socket. When set to a non-empty value, it takes
    ///   precedence over the host and port, and metrics are sent exclusively over the socket.
    /// - `DD_SERVICE`: service identifier attached to every log event. Defaults to `dogstatsd-emitter`.
    /// - `DD_EMITTER_INTERVAL_SECS`: seconds between two ticks of the driver. Defaults to `10`.
    ///
    /// # Errors
    ///
    /// If the port is not a valid port number, the host is empty, or the interval is not a number, an error will be
    /// returned. On platforms without Unix domain sockets, setting `DD_DOGSTATSD_SOCKET` is an error too.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BuildError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(service) = lookup(ENV_SERVICE).filter(|s| !s.is_empty()) {
            builder.service = service;
        }

        if let Some(value) = lookup(ENV_INTERVAL_SECS) {
            builder.interval_secs = value
                .trim()
                .parse::<f64>()
                .map_err(|_| BuildError::InvalidInterval { value: value.clone() })?;
        }

        #[cfg(unix)]
        if let Some(path) = lookup(ENV_DOGSTATSD_SOCKET).filter(|p| !p.is_empty()) {
            builder.remote_addr = RemoteAddr::Unixgram(PathBuf::from(path));
            return Ok(builder);
        }

        #[cfg(not(unix))]
        if let Some(path) = lookup(ENV_DOGSTATSD_SOCKET).filter(|p| !p.is_empty()) {
            return Err(BuildError::UnsupportedTransport {
                reason: format!(
                    "{} is set to '{}', but Unix domain sockets are not available",
                    ENV_DOGSTATSD_SOCKET, path
                ),
            });
        }

        let default = Endpoint::default();
        let host = lookup(ENV_AGENT_HOST).unwrap_or_else(|| default.host().to_owned());
        let port = match lookup(ENV_DOGSTATSD_PORT) {
            Some(value) => parse_port(&value)?,
            None => default.port(),
        };

        builder.remote_addr =
            Endpoint::new(host.trim(), port).map(RemoteAddr::Udp).ok_or(BuildError::MissingEndpoint)?;
        Ok(builder)
    }

    /// Set the remote address to send metrics to.
    ///
    /// For UDP, the address simply needs to be in the format of `<host>:<port>`. For Unix domain sockets, the address
    /// is in the format of `unixgram://<path>`.
    ///
    /// Defaults to sending to `127.0.0.1:8125` over UDP.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the write timeout for sending metrics.
    ///
    /// When the write timeout is reached, the write operation will be aborted and the metric being sent at the time
    /// will be dropped without retrying.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service identifier attached to every log event.
    ///
    /// Defaults to `dogstatsd-emitter`.
    #[must_use]
    pub fn with_service<S>(mut self, service: S) -> Self
    where
        S: Into<String>,
    {
        self.service = service.into();
        self
    }

    /// Set the number of seconds between two ticks of the driver.
    ///
    /// The value is validated when the driver is built.
    ///
    /// Defaults to 10 seconds.
    #[must_use]
    pub fn with_interval_secs(mut self, interval_secs: f64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    /// Returns the configured remote address.
    pub const fn remote_addr(&self) -> &RemoteAddr {
        &self.remote_addr
    }

    /// Returns the configured service identifier.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Builds the emitter.
    pub fn build(self) -> MetricEmitter {
        MetricEmitter::with_transport(
            self.remote_addr,
            self.service,
            DatagramTransport::new(self.write_timeout),
        )
    }

    /// Builds the emitter and a driver that emits `samples` through it on every tick.
    ///
    /// # Errors
    ///
    /// If the configured interval is negative, not finite, or too large, an error will be returned.
    pub fn build_driver(self, samples: Vec<MetricSample>) -> Result<Driver<MetricEmitter>, BuildError> {
        let interval_secs = self.interval_secs;
        let service = self.service.clone();
        Driver::new(self.build(), samples, interval_secs)
            .map(|driver| driver.with_service(service))
            .map_err(BuildError::Driver)
    }
}

impl Default for EmitterBuilder {
    fn default() -> Self {
        EmitterBuilder {
            remote_addr: RemoteAddr::Udp(Endpoint::default()),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            service: DEFAULT_SERVICE.to_owned(),
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

fn parse_port(value: &str) -> Result<u16, BuildError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(BuildError::InvalidPort { value: value.to_owned() }),
    }
}
