use crate::delivery::DeliveryEngine;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Background task that triggers flush passes.
///
/// A pass runs on every `flush_interval` tick when the buffer is non-empty,
/// and whenever [`FlushScheduler::request_flush`] is called (the client does
/// so when the buffer reaches `batch_size`). Passes go through the engine's
/// flight lock, so timer, threshold and manual flushes never overlap.
pub struct FlushScheduler {
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// Spawn the flush loop on the current Tokio runtime.
    pub fn start(
        engine: Arc<DeliveryEngine>,
        flush_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let wake_bg = Arc::clone(&wake);
        let shutdown_bg = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_bg.cancelled() => break,
                    _ = wake_bg.notified() => {
                        engine.flush().await;
                    }
                    _ = ticker.tick() => {
                        if !engine.buffer().is_empty() {
                            engine.flush().await;
                        }
                    }
                }
            }
            debug!("flush scheduler stopped");
        });

        Self {
            wake,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Ask the background task for a pass without waiting for it.
    pub fn request_flush(&self) {
        self.wake.notify_one();
    }

    /// Cancel the timer and wait for the loop to exit. A pass already in
    /// progress finishes its current transport call and then stops, leaving
    /// the remaining records in the buffer.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
