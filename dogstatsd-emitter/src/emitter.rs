use std::io;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    forwarder::{
        sync::{DatagramTransport, Transport},
        RemoteAddr,
    },
    writer::{format_counter, MetricSample},
};

/// Errors that could occur while emitting a metric.
///
/// None of these ever reach the caller of [`MetricEmitter::increment`]: they are logged where they happen. They are
/// public so that other sinks and tests can reason about what was rejected and why.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The metric name was empty.
    #[error("metric name must not be empty")]
    EmptyName,

    /// The metric name contained a character reserved by the wire format.
    #[error("metric name '{name}' contains a reserved character")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A tag had an empty key, or contained a character reserved by the wire format.
    #[error("tag '{key}:{value}' has an empty key or contains a reserved character")]
    InvalidTag {
        /// The rejected tag key.
        key: String,

        /// The rejected tag value.
        value: String,
    },

    /// The sample interval was negative, not a finite number, or too large.
    #[error("sample interval must be a finite, non-negative number of seconds (got {secs})")]
    InvalidInterval {
        /// The rejected interval, in seconds.
        secs: f64,
    },

    /// The payload could not be sent.
    #[error("failed to send to {remote}: {source}")]
    Transport {
        /// The remote address the send was attempted against.
        remote: String,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Only part of the payload was written.
    #[error("partial write to {remote}: wrote {written} of {expected} bytes")]
    PartialWrite {
        /// The remote address the send was attempted against.
        remote: String,

        /// Number of bytes actually written.
        written: usize,

        /// Length of the payload.
        expected: usize,
    },
}

/// A sink for metric samples.
///
/// Emitting is infallible from the caller's point of view: implementations handle and report their own failures.
pub trait Emit {
    /// Emits a single sample.
    fn emit(&self, sample: &MetricSample);
}

impl<E> Emit for &E
where
    E: Emit + ?Sized,
{
    fn emit(&self, sample: &MetricSample) {
        (**self).emit(sample);
    }
}

/// Sends counters to a single DogStatsD collector.
pub struct MetricEmitter<T = DatagramTransport> {
    remote: RemoteAddr,
    service: String,
    transport: T,
}

impl MetricEmitter<DatagramTransport> {
    /// Creates a `MetricEmitter` that sends to `remote` using the default [`DatagramTransport`].
    pub fn new<S>(remote: RemoteAddr, service: S) -> Self
    where
        S: Into<String>,
    {
        Self::with_transport(remote, service, DatagramTransport::default())
    }
}

impl<T> MetricEmitter<T>
where
    T: Transport,
{
    /// Creates a `MetricEmitter` that sends to `remote` through `transport`.
    ///
    /// No I/O happens here.
    pub fn with_transport<S>(remote: RemoteAddr, service: S, transport: T) -> Self
    where
        S: Into<String>,
    {
        let service = service.into();

        match &remote {
            RemoteAddr::Udp(endpoint) => info!(
                service = %service,
                transport = remote.transport_id(),
                host = endpoint.host(),
                port = endpoint.port(),
                "DogStatsD client created."
            ),
            #[cfg(unix)]
            RemoteAddr::Unixgram(path) => info!(
                service = %service,
                transport = remote.transport_id(),
                socket_path = %path.display(),
                "DogStatsD client created."
            ),
        }

        Self { remote, service, transport }
    }

    /// Returns the remote address this emitter sends to.
    pub const fn remote_addr(&self) -> &RemoteAddr {
        &self.remote
    }

    /// Returns the service identifier attached to every log event.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Increments the counter `name` by `value`.
    ///
    /// Tags are written in the iteration order of `tags`. Failures are logged, never returned.
    pub fn increment<I, K, V>(&self, name: &str, value: i64, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.emit(&MetricSample::counter(name, value, tags));
    }

    /// Increments the counter `name` by one, without tags.
    pub fn increment_one(&self, name: &str) {
        self.increment(name, 1, std::iter::empty::<(&str, &str)>());
    }

    /// Decrements the counter `name` by `value`.
    pub fn decrement<I, K, V>(&self, name: &str, value: i64, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.increment(name, value.saturating_neg(), tags);
    }

    /// Formats and sends `sample`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// If the sample is invalid, or the transport fails or only partially writes the payload, an error is returned.
    pub fn try_emit(&self, sample: &MetricSample) -> Result<usize, EmitError> {
        let wire = format_counter(sample)?;

        info!(
            service = %self.service,
            metric = sample.name(),
            value = sample.value(),
            wire = %wire,
            "Sending metric."
        );

        let written = self.transport.send(&self.remote, wire.as_bytes()).map_err(|source| {
            EmitError::Transport { remote: self.remote.to_string(), source }
        })?;

        if written < wire.len() {
            return Err(EmitError::PartialWrite {
                remote: self.remote.to_string(),
                written,
                expected: wire.len(),
            });
        }

        Ok(written)
    }
}

impl<T> Emit for MetricEmitter<T>
where
    T: Transport,
{
    fn emit(&self, sample: &MetricSample) {
        match self.try_emit(sample) {
            Ok(bytes_written) => info!(
                service = %self.service,
                metric = sample.name(),
                bytes_written,
                "Metric sent."
            ),
            Err(e @ (EmitError::EmptyName | EmitError::InvalidName { .. } | EmitError::InvalidTag { .. })) => warn!(
                service = %self.service,
                metric = sample.name(),
                error = %e,
                "Rejected metric sample."
            ),
            Err(e) => error!(
                service = %self.service,
                metric = sample.name(),
                remote = %self.remote,
                transport = self.remote.transport_id(),
                error = %e,
                "Failed to send metric."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use mockall::Sequence;
    use tracing::Level;

    use super::{EmitError, MetricEmitter};
    use crate::{
        forwarder::{Endpoint, RemoteAddr},
        test_util::{capture_events, MockTestTransport},
        writer::MetricSample,
    };

    fn udp_remote() -> RemoteAddr {
        RemoteAddr::Udp(Endpoint::new("datadog-agent", 8125).unwrap())
    }

    #[test]
    fn increment_sends_formatted_line() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .withf(|remote, payload| *remote == udp_remote() && payload == b"items:7|c|#env:sandbox")
            .times(1)
            .returning(|_, payload| Ok(payload.len()));

        let emitter = MetricEmitter::with_transport(udp_remote(), "checkout", transport);
        emitter.increment("items", 7, [("env", "sandbox")]);
    }

    #[test]
    fn increment_one_and_decrement() {
        let mut transport = MockTestTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .withf(|_, payload| payload == b"requests:1|c")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, payload| Ok(payload.len()));
        transport
            .expect_send()
            .withf(|_, payload| payload == b"php.services_count:-2|c|#env:sandbox")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, payload| Ok(payload.len()));

        let emitter = MetricEmitter::with_transport(udp_remote(), "checkout", transport);
        emitter.increment_one("requests");
        emitter.decrement("php.services_count", 2, [("env", "sandbox")]);
    }

    #[test]
    fn empty_name_never_reaches_transport() {
        let mut transport = MockTestTransport::new();
        transport.expect_send().times(0);

        let emitter = MetricEmitter::with_transport(udp_remote(), "checkout", transport);
        let (_, events) = capture_events(|| emitter.increment_one(""));

        assert!(matches!(
            emitter.try_emit(&MetricSample::counter("", 1, [("env", "sandbox")])),
            Err(EmitError::EmptyName)
        ));
        assert_eq!(events.iter().filter(|e| e.level == Level::ERROR).count(), 0);
        assert_eq!(events.iter().filter(|e| e.level == Level::WARN).count(), 1);
    }

    #[test]
    fn transport_failure_is_logged_once() {
        let mut transport = MockTestTransport::new();
        transport.expect_send().times(1).returning(|_, _| {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
        });

        let emitter = MetricEmitter::with_transport(udp_remote(), "checkout", transport);
        let (_, events) = capture_events(|| emitter.increment("requests", 1, [("env", "sandbox")]));

        let errors = events.iter().filter(|e| e.level == Level::ERROR).collect::<Vec<_>>();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field("remote"), Some("datadog-agent:8125"));
        assert_eq!(errors[0].field("service"), Some("checkout"));
        assert!(errors[0].field("error").unwrap().contains("connection refused"));
        assert!(events.iter().any(|e| e.message() == Some("Sending metric.")));
        assert!(!events.iter().any(|e| e.message() == Some("Metric sent.")));
    }

    #[test]
    fn partial_write_is_reported_as_is() {
        let mut transport = MockTestTransport::new();
        transport.expect_send().times(1).returning(|_, _| Ok(4));

        let emitter = MetricEmitter::with_transport(udp_remote(), "checkout", transport);
        let result = emitter.try_emit(&MetricSample::counter("requests", 1, [("env", "sandbox")]));
        match result {
            Err(EmitError::PartialWrite { written, expected, .. }) => {
                assert_eq!(written, 4);
                assert_eq!(expected, "requests:1|c|#env:sandbox".len());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn failure_does_not_stop_later_sends() {
        const CALLS: usize = 6;
        const FAILING_CALL: usize = 3;

        let mut transport = MockTestTransport::new();
        let mut call = 0;
        transport.expect_send().times(CALLS).returning(move |_, payload| {
            call += 1;
            if call == FAILING_CALL {
                Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
            } else {
                Ok(payload.len())
            }
        });

        let emitter = MetricEmitter::with_transport(udp_remote(), "checkout", transport);
        let (_, events) = capture_events(|| {
            for _ in 0..CALLS {
                emitter.increment_one("requests");
            }
        });

        assert_eq!(events.iter().filter(|e| e.level == Level::ERROR).count(), 1);
        assert_eq!(events.iter().filter(|e| e.message() == Some("Metric sent.")).count(), CALLS - 1);
    }

    #[test]
    fn construction_logs_endpoint() {
        let (_, events) = capture_events(|| {
            MetricEmitter::with_transport(udp_remote(), "checkout", MockTestTransport::new())
        });

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message(), Some("DogStatsD client created."));
        assert_eq!(events[0].field("host"), Some("datadog-agent"));
        assert_eq!(events[0].field("port"), Some("8125"));
        assert_eq!(events[0].field("transport"), Some("udp"));
    }

    #[test]
    fn bad_tag_never_reaches_transport() {
        let mut transport = MockTestTransport::new();
        transport.expect_send().times(0);

        let emitter = MetricEmitter::with_transport(udp_remote(), "checkout", transport);
        let (_, events) = capture_events(|| emitter.increment("requests", 1, [("env", "sandbox\nfake:1|c")]));

        let warnings = events.iter().filter(|e| e.level == Level::WARN).collect::<Vec<_>>();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message(), Some("Rejected metric sample."));
        assert_eq!(warnings[0].field("service"), Some("checkout"));
        assert_eq!(events.iter().filter(|e| e.level == Level::ERROR).count(), 0);
    }
}
