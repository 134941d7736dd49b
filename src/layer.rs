use crate::hook::FirehoseHook;
use crate::level::Level;
use crate::record::{Entry, FieldValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate are never forwarded, so the hook's own
/// diagnostics cannot feed back into the queue.
const OWN_TARGET: &str = "firehose_log_sink";

/// `tracing_subscriber` layer that turns events into [`Entry`]s and fires
/// them on a [`FirehoseHook`].
///
/// The event's level is checked against the hook's level set before any
/// field is recorded. Queueing never blocks the application thread; see
/// [`FirehoseHook::fire`] for the overflow policy.
#[derive(Clone)]
pub struct FirehoseLayer {
    hook: Arc<FirehoseHook>,
}

impl FirehoseLayer {
    pub fn new(hook: Arc<FirehoseHook>) -> Self {
        Self { hook }
    }

    pub fn hook(&self) -> &Arc<FirehoseHook> {
        &self.hook
    }
}

impl<S> Layer<S> for FirehoseLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) {
            return;
        }
        let level = Level::from(*meta.level());
        if !self.hook.is_enabled(level) {
            return;
        }

        let mut entry = Entry::new(level, String::new());
        let mut visitor = FieldVisitor {
            fields: &mut entry.data,
            message: &mut entry.message,
        };
        event.record(&mut visitor);

        self.hook.fire(entry);
    }
}

/// Records event fields into an entry's data map. The `message` field
/// becomes the entry message.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut String,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.insert(field, FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, FieldValue::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = format!("{:?}", value);
        } else {
            self.insert(field, FieldValue::from(format!("{:?}", value)));
        }
    }
}
