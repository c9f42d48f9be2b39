use std::{fmt, io, sync::Arc};

use indexmap::IndexMap;
use mockall::mock;
use parking_lot::Mutex;
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{layer::Context, layer::SubscriberExt as _, Layer, Registry};

use crate::forwarder::{sync::Transport, RemoteAddr};

mock! {
    pub TestTransport {}

    impl Transport for TestTransport {
        fn send(&self, remote: &RemoteAddr, payload: &[u8]) -> io::Result<usize>;
    }
}

/// A log event seen by [`CaptureLayer`].
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: IndexMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.field("message")
    }
}

#[derive(Default)]
struct FieldVisitor(IndexMap<String, String>);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_owned(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_owned(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{:?}", value));
    }
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events
            .lock()
            .push(CapturedEvent { level: *event.metadata().level(), fields: visitor.0 });
    }
}

/// Runs `f` with a thread-local subscriber that records every event, returning the result of `f` and the events.
pub fn capture_events<F, R>(f: F) -> (R, Vec<CapturedEvent>)
where
    F: FnOnce() -> R,
{
    let layer = CaptureLayer::default();
    let events = Arc::clone(&layer.events);
    let subscriber = Registry::default().with(layer);

    let result = tracing::subscriber::with_default(subscriber, f);
    let events = std::mem::take(&mut *events.lock());
    (result, events)
}
