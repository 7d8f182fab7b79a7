//! Shared helpers for integration tests
//!
//! Captures `tracing` events emitted on the current thread so tests can
//! assert which retry and recovery events occurred.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// One recorded event
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// Events recorded while the guard is alive
#[derive(Debug, Clone, Default)]
pub struct Captured {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl Captured {
    /// Events on the `resilient` target at `level`
    pub fn at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.target == "resilient" && event.level == level)
            .cloned()
            .collect()
    }

    /// Retry events (one per scheduled retry)
    pub fn retries(&self) -> Vec<CapturedEvent> {
        self.at(Level::DEBUG).into_iter().filter(|e| e.message.starts_with("Retrying")).collect()
    }

    /// Recovery events (success after at least one failure)
    pub fn recoveries(&self) -> Vec<CapturedEvent> {
        self.at(Level::INFO).into_iter().filter(|e| e.message.contains("succeeded after")).collect()
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }
}

impl FieldVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

struct CaptureLayer {
    captured: Captured,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.captured.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Capture events on this thread until the guard drops
///
/// Use with current-thread runtimes so every event lands here.
pub fn capture_events() -> (Captured, DefaultGuard) {
    let captured = Captured::default();
    let subscriber =
        tracing_subscriber::registry().with(CaptureLayer { captured: captured.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (captured, guard)
}
