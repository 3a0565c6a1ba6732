use crate::client::LogTideClient;
use crate::record::{LogLevel, Metadata};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event targets that are never forwarded. Shipping them would feed the
/// client's own diagnostics (and the HTTP stack it drives) back into it.
const IGNORED_TARGET_PREFIXES: &[&str] = &["logtide", "hyper", "reqwest", "h2", "rustls"];

/// `tracing_subscriber` layer that forwards application events to a
/// [`LogTideClient`].
///
/// Events at or above `min_level` become records for `service`; the
/// `message` field becomes the record message and every other field is
/// copied into metadata together with the event's source location. The
/// client call only enqueues, so this never blocks the emitting thread on
/// network I/O.
pub struct LogTideLayer {
    client: Arc<LogTideClient>,
    service: String,
    min_level: Level,
}

impl LogTideLayer {
    pub fn new(client: Arc<LogTideClient>, service: impl Into<String>, min_level: Level) -> Self {
        Self {
            client,
            service: service.into(),
            min_level,
        }
    }
}

fn map_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGET_PREFIXES.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

impl<S> Layer<S> for LogTideLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // `Level` orders more verbose levels as greater.
        if *meta.level() > self.min_level || is_ignored(meta.target()) {
            return;
        }

        let mut fields = Metadata::new();
        let mut message: Option<String> = None;
        event.record(&mut FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        });

        fields.insert("target".to_string(), meta.target().into());
        if let Some(module_path) = meta.module_path() {
            fields.insert("module_path".to_string(), module_path.into());
        }
        if let Some(file) = meta.file() {
            fields.insert("file".to_string(), file.into());
        }
        if let Some(line) = meta.line() {
            fields.insert("line".to_string(), line.into());
        }

        self.client.log(
            map_level(meta.level()),
            &self.service,
            message.unwrap_or_default(),
            fields,
        );
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Metadata,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), value.into());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{:?}", value).into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_onto_record_levels() {
        assert_eq!(map_level(&Level::ERROR), LogLevel::Error);
        assert_eq!(map_level(&Level::WARN), LogLevel::Warn);
        assert_eq!(map_level(&Level::INFO), LogLevel::Info);
        assert_eq!(map_level(&Level::DEBUG), LogLevel::Debug);
        assert_eq!(map_level(&Level::TRACE), LogLevel::Debug);
    }

    #[test]
    fn own_and_http_stack_targets_are_ignored() {
        assert!(is_ignored("logtide"));
        assert!(is_ignored("logtide::delivery"));
        assert!(is_ignored("hyper::client::pool"));
        assert!(!is_ignored("logtide_demo"));
        assert!(!is_ignored("my_app::handlers"));
    }
}
