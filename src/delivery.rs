//! Batching and retrying delivery of buffered records.

use crate::buffer::BoundedBuffer;
use crate::circuit_breaker::CircuitBreaker;
use crate::metrics::Metrics;
use crate::record::LogRecord;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry schedule for one batch: `base * 2^attempt`, capped at
/// [`MAX_BACKOFF`], for at most `max_retries` resends.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_retries: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max_retries,
            attempt: 0,
        }
    }

    /// Delay before the next resend, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(MAX_BACKOFF);
        self.attempt += 1;
        Some(delay)
    }

    pub fn retries_used(&self) -> u32 {
        self.attempt
    }
}

/// Totals for one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches: usize,
    pub sent: usize,
    pub dropped: usize,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

enum BatchOutcome {
    Delivered,
    Abandoned,
}

/// A batch taken out of the buffer whose outcome is not yet counted.
///
/// If the pass is dropped while the transport call is pending (the close
/// deadline fired), the batch is counted as dropped here.
struct InFlight<'a> {
    metrics: &'a Metrics,
    len: usize,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn new(metrics: &'a Metrics, len: usize) -> Self {
        Self {
            metrics,
            len,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(batch_size = self.len, "batch abandoned mid-flight");
            self.metrics.add_dropped(self.len as u64);
        }
    }
}

/// Static settings for a [`DeliveryEngine`].
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub debug: bool,
}

/// Drains the buffer in FIFO batches and pushes them through the transport.
///
/// At most one flush pass runs at a time; concurrent callers queue on the
/// flight lock and then find whatever the previous pass left behind.
pub struct DeliveryEngine {
    buffer: Arc<BoundedBuffer>,
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<Metrics>,
    config: DeliveryConfig,
    flight: Mutex<()>,
    shutdown: CancellationToken,
}

impl DeliveryEngine {
    pub fn new(
        buffer: Arc<BoundedBuffer>,
        transport: Arc<dyn Transport>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<Metrics>,
        config: DeliveryConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            transport,
            breaker,
            metrics,
            config: DeliveryConfig {
                batch_size: config.batch_size.max(1),
                ..config
            },
            flight: Mutex::new(()),
            shutdown,
        }
    }

    pub fn buffer(&self) -> &BoundedBuffer {
        &self.buffer
    }

    /// Run one flush pass over the records buffered when it starts.
    ///
    /// Delivery failures never surface as errors here; they are counted in
    /// the metrics and summarised in the returned [`FlushReport`]. Once
    /// shutdown begins the pass stops after the batch in flight and leaves
    /// the rest for [`final_flush`](Self::final_flush).
    pub async fn flush(&self) -> FlushReport {
        self.run_pass(true).await
    }

    /// The single pass run while closing: it keeps going after shutdown is
    /// signalled, but backoff sleeps are still cut short. Callers bound it
    /// with a deadline; a batch whose call is dropped mid-flight is counted
    /// as dropped.
    pub async fn final_flush(&self) -> FlushReport {
        self.run_pass(false).await
    }

    async fn run_pass(&self, stop_on_shutdown: bool) -> FlushReport {
        let _flight = self.flight.lock().await;
        let mut report = FlushReport::default();

        // Bound the pass so producers cannot keep it running forever.
        let mut remaining = self.buffer.len();

        while remaining > 0 {
            if stop_on_shutdown && self.shutdown.is_cancelled() {
                debug!(remaining, "shutdown requested, leaving rest for final flush");
                break;
            }

            let batch = self.buffer.drain_up_to(self.config.batch_size.min(remaining));
            if batch.is_empty() {
                break;
            }
            let n = batch.len();
            remaining -= n;
            report.batches += 1;

            if let Err(e) = self.breaker.try_acquire() {
                self.metrics.add_error();
                self.metrics.add_dropped(n as u64);
                report.dropped += n;
                warn!(batch_size = n, error = %e, "dropping batch");
                break;
            }

            let in_flight = InFlight::new(&self.metrics, n);
            let outcome = self.deliver(&batch).await;
            in_flight.settle();

            match outcome {
                BatchOutcome::Delivered => report.sent += n,
                BatchOutcome::Abandoned => report.dropped += n,
            }
        }

        if self.config.debug && report.batches > 0 {
            debug!(
                batches = report.batches,
                sent = report.sent,
                dropped = report.dropped,
                "flush pass finished"
            );
        }
        report
    }

    async fn deliver(&self, batch: &[Arc<LogRecord>]) -> BatchOutcome {
        let n = batch.len();
        let mut backoff = Backoff::new(self.config.retry_delay, self.config.max_retries);

        loop {
            let started = Instant::now();
            let err = match self.transport.send_batch(batch).await {
                Ok(()) => {
                    self.metrics.record_latency(started.elapsed());
                    self.metrics.add_sent(n as u64);
                    self.breaker.record_success();
                    if self.config.debug {
                        debug!(batch_size = n, retries = backoff.retries_used(), "batch delivered");
                    }
                    return BatchOutcome::Delivered;
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(batch_size = n, error = %err, "batch rejected, not retrying");
                return self.abandon(n);
            }

            let Some(delay) = backoff.next_delay() else {
                error!(
                    batch_size = n,
                    retries = backoff.retries_used(),
                    error = %err,
                    "retries exhausted, abandoning batch"
                );
                return self.abandon(n);
            };

            warn!(
                batch_size = n,
                attempt = backoff.retries_used(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "batch delivery failed, retrying"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    warn!(batch_size = n, "shutdown during backoff, abandoning batch");
                    return self.abandon(n);
                }
                _ = sleep(delay) => {}
            }
            self.metrics.add_retry();
        }
    }

    fn abandon(&self, n: usize) -> BatchOutcome {
        self.breaker.record_failure();
        self.metrics.add_error();
        self.metrics.add_dropped(n as u64);
        BatchOutcome::Abandoned
    }
}
