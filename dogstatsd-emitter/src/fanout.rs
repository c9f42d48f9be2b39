use std::time::Duration;

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    builder::{BuildError, DEFAULT_SERVICE},
    emitter::{Emit, MetricEmitter},
    forwarder::{
        sync::{DatagramTransport, Transport, DEFAULT_WRITE_TIMEOUT},
        RemoteAddr,
    },
    writer::MetricSample,
};

/// Fans out metrics to multiple DogStatsD collectors.
///
/// Every destination owns its own [`MetricEmitter`] and performs its own transport call, so a destination that is
/// down or slow never prevents the others from receiving the sample.
pub struct Fanout<T = DatagramTransport> {
    destinations: IndexMap<String, MetricEmitter<T>>,
}

impl<T> Fanout<T>
where
    T: Transport,
{
    /// Creates a `Fanout` from already-built emitters, keyed by destination ID.
    ///
    /// If the same ID appears more than once, the last emitter wins.
    pub fn from_emitters<I, S>(emitters: I) -> Self
    where
        I: IntoIterator<Item = (S, MetricEmitter<T>)>,
        S: Into<String>,
    {
        let destinations = emitters.into_iter().map(|(id, emitter)| (id.into(), emitter)).collect();
        Self { destinations }
    }

    /// Returns the number of destinations.
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// Returns `true` if there are no destinations.
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Returns the destination IDs, in the order they were added.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.destinations.keys().map(String::as_str)
    }

    /// Returns the emitter for the given destination, if any.
    pub fn get(&self, id: &str) -> Option<&MetricEmitter<T>> {
        self.destinations.get(id)
    }

    /// Increments the counter `name` by `value` on every destination.
    pub fn increment<I, K, V>(&self, name: &str, value: i64, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.emit(&MetricSample::counter(name, value, tags));
    }

    /// Decrements the counter `name` by `value` on every destination.
    pub fn decrement<I, K, V>(&self, name: &str, value: i64, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.increment(name, value.saturating_neg(), tags);
    }
}

impl<T> Emit for Fanout<T>
where
    T: Transport,
{
    fn emit(&self, sample: &MetricSample) {
        for (id, emitter) in &self.destinations {
            debug!(
                service = emitter.service(),
                destination = id.as_str(),
                metric = sample.name(),
                "Fanning out metric."
            );
            emitter.emit(sample);
        }
    }
}

/// Builder for a [`Fanout`] over UDP/UDS destinations.
pub struct FanoutBuilder {
    service: String,
    write_timeout: Duration,
    destinations: IndexMap<String, RemoteAddr>,
}

impl FanoutBuilder {
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

    /// Set the write timeout used by every destination.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Adds a destination.
    ///
    /// The address uses the same format as [`EmitterBuilder::with_remote_address`][crate::EmitterBuilder::with_remote_address].
    ///
    /// # Errors
    ///
    /// If the address cannot be parsed, or a destination with the same ID was already added, an error is returned.
    pub fn add_destination<S, A>(mut self, id: S, addr: A) -> Result<Self, BuildError>
    where
        S: Into<String>,
        A: AsRef<str>,
    {
        let id = id.into();
        if self.destinations.contains_key(&id) {
            return Err(BuildError::DuplicateDestination { id });
        }

        let remote = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        self.destinations.insert(id, remote);
        Ok(self)
    }

    /// Builds the `Fanout`, creating one emitter per destination.
    pub fn build(self) -> Fanout {
        let transport = DatagramTransport::new(self.write_timeout);
        let service = self.service;

        Fanout::from_emitters(self.destinations.into_iter().map(|(id, remote)| {
            let emitter = MetricEmitter::with_transport(remote, service.clone(), transport.clone());
            (id, emitter)
        }))
    }
}

impl Default for FanoutBuilder {
    fn default() -> Self {
        FanoutBuilder {
            service: DEFAULT_SERVICE.to_owned(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            destinations: IndexMap::new(),
        }
    }
}
