//! `tracing` adapter: events in, JSON lines out.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::sender::BatchSender;

/// Forwards `tracing` events to a [`BatchSender`] as one JSON line each:
/// timestamp, level, target, message, then the event's fields.
///
/// `on_event` runs on the logging hot path, so records are offered without
/// suspending; when the queue is full the record is counted as dropped. The
/// sender's own diagnostics are skipped so they cannot feed back into the
/// queue.
pub struct OssLogLayer {
    sender: BatchSender,
}

impl OssLogLayer {
    pub fn new(sender: BatchSender) -> Self {
        Self { sender }
    }
}

impl<S: Subscriber> Layer<S> for OssLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(env!("CARGO_PKG_NAME")) {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut object = Map::new();
        object.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert(
            "level".to_string(),
            Value::String(meta.level().to_string()),
        );
        object.insert(
            "target".to_string(),
            Value::String(meta.target().to_string()),
        );
        if let Some(message) = visitor.message {
            object.insert("message".to_string(), Value::String(message));
        }
        for (key, value) in visitor.fields {
            object.insert(key, value);
        }

        self.sender.try_offer(Value::Object(object).to_string());
    }
}

/// Collects event fields into JSON values, routing `message` to its own slot.
#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        match serde_json::Number::from_f64(value) {
            Some(number) => self.insert(field, Value::Number(number)),
            // NaN and infinities have no JSON representation
            None => self.insert(field, Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }
}
