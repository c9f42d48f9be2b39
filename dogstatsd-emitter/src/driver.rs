use std::{
    thread::sleep,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    builder::DEFAULT_SERVICE,
    emitter::{Emit, EmitError},
    writer::MetricSample,
};

/// Emits a fixed set of samples, forever, at a fixed interval.
pub struct Driver<E> {
    sink: E,
    samples: Vec<MetricSample>,
    interval: Duration,
    service: String,
}

impl<E> Driver<E>
where
    E: Emit,
{
    /// Creates a new `Driver`.
    ///
    /// # Errors
    ///
    /// If `interval_secs` is negative, not finite, or too large to be represented as a [`Duration`], an error is
    /// returned.
    pub fn new(sink: E, samples: Vec<MetricSample>, interval_secs: f64) -> Result<Self, EmitError> {
        let interval = Duration::try_from_secs_f64(interval_secs)
            .map_err(|_| EmitError::InvalidInterval { secs: interval_secs })?;

        Ok(Self { sink, samples, interval, service: DEFAULT_SERVICE.to_owned() })
    }

    /// Set the service identifier attached to the driver's own log events.
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

    /// Returns the interval between two ticks.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the samples emitted on every tick.
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Emits every sample once, in order.
    pub fn tick(&self) {
        for sample in &self.samples {
            self.sink.emit(sample);
        }

        debug!(service = %self.service, samples = self.samples.len(), "Finished tick.");
    }

    /// Runs the driver until the process is terminated.
    pub fn run(self) -> ! {
        let mut next_tick = Instant::now();
        loop {
            // If the previous tick took longer than the interval, we won't sleep at all.
            if let Some(sleep_duration) = next_tick.checked_duration_since(Instant::now()) {
                sleep(sleep_duration);
            }

            next_tick = Instant::now() + self.interval;
            self.tick();
        }
    }
}
