use crate::buffer::BoundedBuffer;
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::delivery::{DeliveryConfig, DeliveryEngine, FlushReport};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::options::{ClientOptions, ConfigError};
use crate::record::{ErrorInfo, LogLevel, LogRecord, Metadata};
use crate::scheduler::FlushScheduler;
use crate::trace;
use crate::transport::Transport;
use std::error::Error;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `close` waits for the final flush before giving up.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const UNKNOWN_SERVICE: &str = "unknown";

/// Error type returned by [`LogTideClient::flush`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("client is closed")]
    Closed,

    #[error("flush incomplete: {sent} records sent, {dropped} dropped")]
    Incomplete { sent: usize, dropped: usize },
}

/// Entry point for application code.
///
/// Logging calls only build a record and append it to the in-memory
/// buffer; a background task started at construction batches and ships
/// the records. Producers are never blocked by, or exposed to, delivery
/// failures.
///
/// After [`close`](LogTideClient::close) every logging call is a no-op that
/// counts one dropped record, and [`flush`](LogTideClient::flush) fails with
/// [`ClientError::Closed`].
pub struct LogTideClient {
    options: ClientOptions,
    buffer: Arc<BoundedBuffer>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<Metrics>,
    engine: Arc<DeliveryEngine>,
    scheduler: FlushScheduler,
    closed: AtomicBool,
    // Set by `close` before its last drain; a producer that lands a record
    // after this point drains and counts it itself.
    sealed: AtomicBool,
}

impl LogTideClient {
    /// Build a client that ships to the LogTide HTTP API.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(feature = "http")]
    pub fn new(options: ClientOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let transport = crate::http::HttpTransport::new(&options)?;
        Self::with_transport(options, Arc::new(transport))
    }

    /// Build a client around any [`Transport`] implementation.
    pub fn with_transport(
        options: ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let metrics = Arc::new(Metrics::new(options.enable_metrics));
        let buffer = Arc::new(BoundedBuffer::new(
            options.max_buffer_size,
            Arc::clone(&metrics),
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            options.circuit_breaker_config(),
            Arc::clone(&metrics),
        ));
        let shutdown = CancellationToken::new();
        let engine = Arc::new(DeliveryEngine::new(
            Arc::clone(&buffer),
            transport,
            Arc::clone(&breaker),
            Arc::clone(&metrics),
            DeliveryConfig {
                batch_size: options.batch_size,
                max_retries: options.max_retries,
                retry_delay: options.retry_delay,
                debug: options.debug,
            },
            shutdown.clone(),
        ));
        let scheduler = FlushScheduler::start(Arc::clone(&engine), options.flush_interval, shutdown);

        info!(
            batch_size = options.batch_size,
            flush_interval_ms = options.flush_interval.as_millis() as u64,
            max_buffer_size = options.max_buffer_size,
            "log client started"
        );

        Ok(Self {
            options,
            buffer,
            breaker,
            metrics,
            engine,
            scheduler,
            closed: AtomicBool::new(false),
            sealed: AtomicBool::new(false),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Build a record and enqueue it. Never blocks on I/O and never fails.
    pub fn log(
        &self,
        level: LogLevel,
        service: &str,
        message: impl Into<String>,
        metadata: Metadata,
    ) {
        self.enqueue(level, service, message.into(), metadata, None);
    }

    pub fn debug(&self, service: &str, message: impl Into<String>) {
        self.log(LogLevel::Debug, service, message, Metadata::new());
    }

    pub fn info(&self, service: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, service, message, Metadata::new());
    }

    pub fn warn(&self, service: &str, message: impl Into<String>) {
        self.log(LogLevel::Warn, service, message, Metadata::new());
    }

    pub fn error(&self, service: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, service, message, Metadata::new());
    }

    pub fn critical(&self, service: &str, message: impl Into<String>) {
        self.log(LogLevel::Critical, service, message, Metadata::new());
    }

    pub fn debug_with(&self, service: &str, message: impl Into<String>, metadata: Metadata) {
        self.log(LogLevel::Debug, service, message, metadata);
    }

    pub fn info_with(&self, service: &str, message: impl Into<String>, metadata: Metadata) {
        self.log(LogLevel::Info, service, message, metadata);
    }

    pub fn warn_with(&self, service: &str, message: impl Into<String>, metadata: Metadata) {
        self.log(LogLevel::Warn, service, message, metadata);
    }

    pub fn error_with(&self, service: &str, message: impl Into<String>, metadata: Metadata) {
        self.log(LogLevel::Error, service, message, metadata);
    }

    pub fn critical_with(&self, service: &str, message: impl Into<String>, metadata: Metadata) {
        self.log(LogLevel::Critical, service, message, metadata);
    }

    /// Record carrying the message and source chain of `cause` next to the
    /// caller's metadata.
    pub fn log_with_cause(
        &self,
        level: LogLevel,
        service: &str,
        message: impl Into<String>,
        metadata: Metadata,
        cause: &(dyn Error + '_),
    ) {
        let info = ErrorInfo::from_error(cause);
        self.enqueue(level, service, message.into(), metadata, Some(info));
    }

    /// Error-level record carrying the message and source chain of `cause`.
    pub fn error_with_cause(
        &self,
        service: &str,
        message: impl Into<String>,
        cause: &(dyn Error + '_),
    ) {
        self.log_with_cause(LogLevel::Error, service, message, Metadata::new(), cause);
    }

    pub fn critical_with_cause(
        &self,
        service: &str,
        message: impl Into<String>,
        cause: &(dyn Error + '_),
    ) {
        self.log_with_cause(LogLevel::Critical, service, message, Metadata::new(), cause);
    }

    fn enqueue(
        &self,
        level: LogLevel,
        service: &str,
        message: String,
        metadata: Metadata,
        error: Option<ErrorInfo>,
    ) {
        if self.closed.load(Ordering::Acquire) {
            self.metrics.add_dropped(1);
            if self.options.debug {
                debug!(service, "client closed, dropping record");
            }
            return;
        }

        let service = if service.trim().is_empty() {
            UNKNOWN_SERVICE
        } else {
            service
        };

        let mut merged = self.options.global_metadata.clone();
        merged.extend(metadata);

        let trace_id = trace::current_trace_id().or_else(|| {
            self.options
                .auto_trace_id
                .then(trace::generate_trace_id)
        });

        let record = LogRecord::new(level, service, message)
            .with_metadata(merged)
            .with_trace_id(trace_id)
            .with_error(error);

        if self.options.debug {
            debug!(service, level = %level, "enqueueing record");
        }

        self.push(Arc::new(record));
    }

    fn push(&self, record: Arc<LogRecord>) {
        let len = self.buffer.enqueue(record);

        // Raced with `close`: its last drain may already have run.
        if self.sealed.load(Ordering::SeqCst) {
            let late = self.buffer.drain_all().len();
            if late > 0 {
                self.metrics.add_dropped(late as u64);
            }
            return;
        }

        if len >= self.options.batch_size {
            self.scheduler.request_flush();
        }
    }

    /// Deliver everything currently buffered and wait for the outcome.
    ///
    /// Runs after any pass already in flight. Returns
    /// [`ClientError::Incomplete`] if any record of this pass was dropped.
    pub async fn flush(&self) -> Result<FlushReport, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        let report = self.engine.flush().await;
        if report.is_complete() {
            Ok(report)
        } else {
            Err(ClientError::Incomplete {
                sent: report.sent,
                dropped: report.dropped,
            })
        }
    }

    /// Fire-and-forget form of [`flush`](LogTideClient::flush).
    pub fn request_flush(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        self.scheduler.request_flush();
        Ok(())
    }

    /// Stop background flushing, make one best-effort final flush and
    /// release resources. Safe to call more than once.
    ///
    /// A background pass already running stops after its current transport
    /// call. Pending backoff sleeps are cancelled, so the final pass tries
    /// each batch once. Whatever is not delivered within [`SHUTDOWN_TIMEOUT`],
    /// including a batch whose call is still pending, is counted as dropped.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.scheduler.stop().await;

        let report = match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.engine.final_flush()).await {
            Ok(report) => report,
            Err(_) => {
                warn!(
                    timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64,
                    "final flush timed out"
                );
                FlushReport::default()
            }
        };

        self.sealed.store(true, Ordering::SeqCst);
        let leftover = self.buffer.drain_all().len();
        if leftover > 0 {
            self.metrics.add_dropped(leftover as u64);
        }

        info!(
            sent = report.sent,
            dropped = report.dropped + leftover,
            "log client closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn get_circuit_breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Number of records waiting for delivery.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_trace_id(&self) -> Option<String> {
        trace::current_trace_id()
    }

    pub async fn with_trace_id<F>(&self, id: impl Into<String>, fut: F) -> F::Output
    where
        F: Future,
    {
        trace::with_trace_id(id, fut).await
    }

    pub async fn with_new_trace_id<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        trace::with_new_trace_id(fut).await
    }

    pub fn with_trace_id_sync<R>(&self, id: impl Into<String>, f: impl FnOnce() -> R) -> R {
        trace::with_trace_id_sync(id, f)
    }
}
