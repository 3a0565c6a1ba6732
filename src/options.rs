use crate::circuit_breaker::CircuitBreakerConfig;
use crate::record::Metadata;
use std::time::Duration;

/// Configuration snapshot for a [`LogTideClient`](crate::client::LogTideClient).
///
/// **Fields**
/// - `api_url` / `api_key`: ingestion endpoint base URL and the key sent
///   with every request.
/// - `batch_size`: maximum records per transport call; reaching it in the
///   buffer also triggers an immediate background flush.
/// - `flush_interval`: period of the background flush timer.
/// - `max_buffer_size`: buffer capacity; beyond it the oldest record is
///   dropped.
/// - `max_retries`, `retry_delay`: resend budget and base of the
///   exponential backoff for retryable failures.
/// - `circuit_breaker_threshold`, `circuit_breaker_reset`: consecutive
///   failed batches that open the breaker, and its cooldown.
/// - `enable_metrics`: when `false` all counters stay at zero.
/// - `debug`: emit per-record and per-batch `tracing::debug!` diagnostics.
/// - `global_metadata`: merged into every record; per-call keys win.
/// - `auto_trace_id`: give records logged outside any trace scope a
///   one-off generated trace id.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub api_url: String,
    pub api_key: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_buffer_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset: Duration,
    pub enable_metrics: bool,
    pub debug: bool,
    pub global_metadata: Metadata,
    pub auto_trace_id: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            max_buffer_size: 10_000,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            circuit_breaker_threshold: 5,
            circuit_breaker_reset: Duration::from_secs(30),
            enable_metrics: true,
            debug: false,
            global_metadata: Metadata::new(),
            auto_trace_id: false,
        }
    }
}

impl ClientOptions {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(bool, &'static str, &'static str); 8] = [
            (!self.api_url.trim().is_empty(), "api_url", "non-empty"),
            (!self.api_key.trim().is_empty(), "api_key", "non-empty"),
            (self.batch_size >= 1, "batch_size", "at least 1"),
            (!self.flush_interval.is_zero(), "flush_interval", "greater than zero"),
            (
                self.max_buffer_size >= self.batch_size,
                "max_buffer_size",
                "at least batch_size",
            ),
            (!self.retry_delay.is_zero(), "retry_delay", "greater than zero"),
            (
                self.circuit_breaker_threshold >= 1,
                "circuit_breaker_threshold",
                "at least 1",
            ),
            (
                !self.circuit_breaker_reset.is_zero(),
                "circuit_breaker_reset",
                "greater than zero",
            ),
        ];

        match checks.into_iter().find(|(ok, _, _)| !ok) {
            Some((_, field, requirement)) => Err(ConfigError::Invalid { field, requirement }),
            None => Ok(()),
        }
    }

    pub(crate) fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_threshold,
            reset_timeout: self.circuit_breaker_reset,
        }
    }
}

/// Error type returned when a client cannot be built from its options.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be {requirement}")]
    Invalid {
        field: &'static str,
        requirement: &'static str,
    },

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("a Tokio runtime is required to run the background flush task")]
    NoRuntime,

    #[error("failed to build HTTP transport: {0}")]
    Transport(String),
}
