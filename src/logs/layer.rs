//! Tracing layer that records the process's own events in the log service

use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use super::entry::{LogLevel, LogRecord, Metadata};
use super::service::LogService;

/// Turns every tracing event that passes the subscriber's filter into an entry.
/// The event target becomes the entry source; fields other than `message`
/// become metadata (redacted by the service).
pub struct CaptureLayer {
    service: Arc<LogService>,
}

impl CaptureLayer {
    pub fn new(service: Arc<LogService>) -> Self {
        Self { service }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Metadata,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, serde_json::Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, serde_json::Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, serde_json::Value::String(value.to_string()));
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            level: LogLevel::from(metadata.level()),
            message: visitor.message.unwrap_or_default(),
            source: Some(metadata.target().to_string()),
            metadata: (!visitor.fields.is_empty()).then_some(visitor.fields),
        };

        self.service.append(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::query::LogQuery;
    use crate::logs::redact::REDACTED;
    use tracing_subscriber::prelude::*;

    fn capture<F: FnOnce()>(service: &Arc<LogService>, f: F) {
        let subscriber = tracing_subscriber::registry().with(CaptureLayer::new(service.clone()));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_events_become_entries() {
        let service = Arc::new(LogService::with_capacity(100, 10));
        capture(&service, || {
            tracing::info!(target: "test1", "first");
            tracing::warn!(target: "test1", "second");
        });

        let page = service.get_page(&LogQuery { source: Some("test1".into()), ..Default::default() });
        let got: Vec<(LogLevel, &str)> =
            page.items.iter().map(|e| (e.level, e.message.as_str())).collect();
        assert_eq!(got, vec![(LogLevel::Info, "first"), (LogLevel::Warning, "second")]);
    }

    #[test]
    fn test_fields_become_redacted_metadata() {
        let service = Arc::new(LogService::with_capacity(100, 10));
        capture(&service, || {
            tracing::info!(target: "api", token = "secret", safe = "ok", attempts = 3u64, "token test");
        });

        let page = service.get_page(&LogQuery::default());
        let entry = &page.items[0];
        assert_eq!(entry.message, "token test");
        let meta = entry.metadata.as_ref().unwrap();
        assert_eq!(meta["token"], REDACTED);
        assert_eq!(meta["safe"], "ok");
        assert_eq!(meta["attempts"], 3);
    }

    #[test]
    fn test_formatted_messages_and_no_fields() {
        let service = Arc::new(LogService::with_capacity(100, 10));
        capture(&service, || {
            let url = "https://example.com";
            tracing::error!("fetch failed for {}", url);
        });

        let page = service.get_page(&LogQuery::default());
        assert_eq!(page.items[0].message, "fetch failed for https://example.com");
        assert_eq!(page.items[0].level, LogLevel::Error);
        assert!(page.items[0].metadata.is_none());
    }
}
