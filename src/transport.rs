use crate::record::LogRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of a failed batch delivery, classified for the retry loop.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network, timeout or server-side failure; the batch may be resent.
    #[error("transient delivery failure: {0}")]
    Retryable(String),

    /// Authentication, validation or other permanent rejection.
    #[error("delivery rejected: {0}")]
    NonRetryable(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Retryable(_))
    }
}

/// Asynchronous destination for batches of [`LogRecord`]s.
///
/// The delivery engine calls `send_batch` from its flush task, never from a
/// producer. Implementations should only report the tri-state outcome;
/// retries, backoff and the circuit breaker are handled by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one batch.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted every record in the batch.
    /// - `Err(TransportError::Retryable)` for failures worth retrying.
    /// - `Err(TransportError::NonRetryable)` for failures that will not
    ///   improve on resend.
    async fn send_batch(&self, batch: &[Arc<LogRecord>]) -> Result<(), TransportError>;
}

/// A transport that accepts and discards every batch.
///
/// Useful for measuring the overhead of the client itself without any
/// external I/O.
#[derive(Clone, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send_batch(&self, _batch: &[Arc<LogRecord>]) -> Result<(), TransportError> {
        Ok(())
    }
}
