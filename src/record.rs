use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Structured key/value payload attached to a record.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Severity of a [`LogRecord`], serialized in lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Captured description of an error passed to an error-level call.
///
/// `stack` holds the rendered `source()` chain, outermost cause first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub message: String,
    pub stack: Vec<String>,
}

impl ErrorInfo {
    pub fn from_error(err: &(dyn Error + '_)) -> Self {
        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }

        ErrorInfo {
            message: err.to_string(),
            stack,
        }
    }
}

/// One log event as it travels from the producer to the transport.
///
/// Records are built once by the client and then shared behind an `Arc`
/// between the buffer, the delivery engine and the transport; nothing
/// mutates them after construction.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub service: String,
    pub message: String,
    pub metadata: Metadata,
    pub trace_id: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl LogRecord {
    pub fn new(level: LogLevel, service: impl Into<String>, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            service: service.into(),
            message: message.into(),
            metadata: Metadata::new(),
            trace_id: None,
            error: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn with_error(mut self, error: Option<ErrorInfo>) -> Self {
        self.error = error;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Leaf;

    impl fmt::Display for Leaf {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection reset")
        }
    }

    impl Error for Leaf {}

    #[derive(Debug)]
    struct Wrapper(Leaf);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("query failed")
        }
    }

    impl Error for Wrapper {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn error_info_walks_source_chain() {
        let info = ErrorInfo::from_error(&Wrapper(Leaf));
        assert_eq!(info.message, "query failed");
        assert_eq!(info.stack, vec!["connection reset".to_string()]);
    }

    #[test]
    fn levels_serialize_lowercase_and_order_by_severity() {
        assert_eq!(serde_json::to_string(&LogLevel::Critical).unwrap(), "\"critical\"");
        assert!(LogLevel::Debug < LogLevel::Warn);
        assert!(LogLevel::Error < LogLevel::Critical);
    }

    #[test]
    fn builder_keeps_optional_parts() {
        let mut metadata = Metadata::new();
        metadata.insert("port".to_string(), serde_json::json!(3000));

        let record = LogRecord::new(LogLevel::Info, "api", "started")
            .with_metadata(metadata)
            .with_trace_id(Some("t-1".to_string()));

        assert_eq!(record.service, "api");
        assert_eq!(record.metadata["port"], serde_json::json!(3000));
        assert_eq!(record.trace_id.as_deref(), Some("t-1"));
        assert!(record.error.is_none());
    }
}
