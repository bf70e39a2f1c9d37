use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{Id, Subscriber};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

/// Span fields whose values key captured records.
const CONVERSATION_KEYS: [&str; 2] = ["conversation_id", "conversation.id"];

/// A log event captured in memory.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    pub level: String,
    pub target: String,
    pub message: String,
    /// Event fields merged over the fields of enclosing spans.
    pub fields: HashMap<String, serde_json::Value>,
}

/// Shared storage for captured log records, grouped by conversation.
#[derive(Debug, Clone, Default)]
pub struct SharedLogStorage {
    records: Arc<RwLock<HashMap<String, Vec<LogRecord>>>>,
}

impl SharedLogStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records captured for a conversation, oldest first.
    pub fn records_for(&self, conversation_id: &str) -> Vec<LogRecord> {
        self.records
            .read()
            .map(|records| records.get(conversation_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Conversation IDs that have at least one record.
    pub fn conversations(&self) -> Vec<String> {
        self.records.read().map(|records| records.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn add(&self, conversation_id: String, record: LogRecord) {
        if let Ok(mut records) = self.records.write() {
            records.entry(conversation_id).or_default().push(record);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

/// A tracing layer that captures events emitted inside conversation spans.
///
/// An event is kept when it, or any span enclosing it, carries a
/// `conversation_id` field; everything else passes through untouched.
pub struct InMemoryLogLayer {
    storage: Arc<SharedLogStorage>,
}

impl InMemoryLogLayer {
    pub fn new(storage: Arc<SharedLogStorage>) -> Self {
        Self { storage }
    }
}

#[derive(Clone, Default)]
struct SpanFields(HashMap<String, serde_json::Value>);

impl<S> Layer<S> for InMemoryLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        let mut fields = visitor.0;

        // Inherit the conversation from the parent unless overridden.
        if let Some(parent) = span.parent() {
            if let Some(parent_fields) = parent.extensions().get::<SpanFields>() {
                for key in CONVERSATION_KEYS {
                    if !fields.contains_key(key) {
                        if let Some(value) = parent_fields.0.get(key) {
                            fields.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }

        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            let mut visitor = JsonVisitor::default();
            values.record(&mut visitor);
            fields.0.extend(visitor.0);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(span_fields) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.0.clone());
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        fields.extend(visitor.0);

        let Some(conversation_id) = CONVERSATION_KEYS
            .iter()
            .find_map(|key| fields.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string)
        else {
            return;
        };

        let message = match fields.remove("message") {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let metadata = event.metadata();

        self.storage.add(
            conversation_id,
            LogRecord {
                timestamp_ms: SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis(),
                level: metadata.level().to_string(),
                target: metadata.target().to_string(),
                message,
                fields,
            },
        );
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info_span;
    use tracing_subscriber::layer::SubscriberExt;

    fn with_capture(f: impl FnOnce()) -> Arc<SharedLogStorage> {
        let storage = Arc::new(SharedLogStorage::new());
        let subscriber =
            tracing_subscriber::registry().with(InMemoryLogLayer::new(storage.clone()));
        tracing::subscriber::with_default(subscriber, f);
        storage
    }

    #[test]
    fn events_inside_conversation_span_are_captured() {
        let storage = with_capture(|| {
            let span = info_span!("generate_response", conversation_id = "conv-1");
            let _guard = span.enter();
            tracing::info!(sources = 2u64, tokens_used = 42u64, "generated response");
        });

        let records = storage.records_for("conv-1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "generated response");
        assert_eq!(records[0].level, "INFO");
        assert_eq!(records[0].fields["tokens_used"], serde_json::json!(42));
        assert_eq!(records[0].fields["conversation_id"], serde_json::json!("conv-1"));
    }

    #[test]
    fn late_recorded_conversation_and_child_spans_are_followed() {
        let storage = with_capture(|| {
            let span = info_span!("generate_response", conversation_id = tracing::field::Empty);
            span.record("conversation_id", "conv-2");
            let _outer = span.enter();
            let child = info_span!("retrieve");
            let _inner = child.enter();
            tracing::warn!("nothing relevant found");
        });

        let records = storage.records_for("conv-2");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "WARN");
    }

    #[test]
    fn events_outside_conversations_are_ignored() {
        let storage = with_capture(|| {
            tracing::info!(collection = "local_knowledge", "created new knowledge collection");
        });
        assert!(storage.conversations().is_empty());
    }

    #[test]
    fn records_serialize_to_json() {
        let storage = with_capture(|| {
            tracing::error!(conversation_id = "c", error = "quota exceeded", "generation failed");
        });
        let json = serde_json::to_value(storage.records_for("c")).unwrap();
        assert_eq!(json[0]["message"], "generation failed");
        assert_eq!(json[0]["fields"]["error"], "quota exceeded");

        storage.clear();
        assert!(storage.records_for("c").is_empty());
    }
}
