//! A minimal [DogStatsD][dsd] client that sends counters to a Datadog Agent.
//!
//! [dsd]: https://docs.datadoghq.com/developers/dogstatsd/
//!
//! # Usage
//!
//! ```no_run
//! # use dogstatsd_emitter::EmitterBuilder;
//! // Read `DD_AGENT_HOST`, `DD_DOGSTATSD_PORT` and friends from the environment, falling back to the local Agent at
//! // `127.0.0.1:8125` over UDP.
//! let emitter = EmitterBuilder::from_env().expect("invalid configuration").build();
//!
//! // Sends `checkout.orders:1|c|#env:sandbox` as a single datagram.
//! emitter.increment("checkout.orders", 1, [("env", "sandbox")]);
//! ```
//!
//! # Delivery
//!
//! Every sample is formatted as one statsd line and sent as one datagram, over a socket that is opened for that send
//! and closed right after. There is no buffering, no aggregation and no retry: if the Agent is unreachable, the failure
//! is logged and the sample is lost. Emitting never returns an error and never panics, so it is safe to call from a
//! loop that must keep running.
//!
//! # Transports
//!
//! UDP is used by default. When a Unix domain socket path is configured (`DD_DOGSTATSD_SOCKET`, or a
//! `unixgram://<path>` remote address), samples are sent exclusively over that socket in `SOCK_DGRAM` mode.
//!
//! # Logging
//!
//! All lifecycle events (client creation, each send attempt, its outcome) are emitted through [`tracing`], with the
//! configured service identifier attached. The bundled binary renders them as JSON lines on stdout.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, EmitterBuilder};

mod driver;
pub use self::driver::Driver;

mod emitter;
pub use self::emitter::{Emit, EmitError, MetricEmitter};

mod fanout;
pub use self::fanout::{Fanout, FanoutBuilder};

mod forwarder;
pub use self::forwarder::{
    sync::{DatagramTransport, Transport},
    Endpoint, RemoteAddr,
};

mod writer;
pub use self::writer::{format_counter, parse_counter, MetricSample, ParseError};

#[cfg(test)]
mod test_util;
