#![allow(dead_code)]

use async_trait::async_trait;
use logtide::record::LogRecord;
use logtide::transport::{Transport, TransportError};
use logtide::ClientOptions;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub enum Mode {
    Succeed,
    Retryable,
    NonRetryable,
}

/// In-memory transport that records every batch it is handed.
pub struct RecordingTransport {
    mode: Mutex<Mode>,
    latency: Mutex<Duration>,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<Arc<LogRecord>>>>,
}

impl RecordingTransport {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            latency: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Make every call take `latency` before it resolves.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<Arc<LogRecord>> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_batch(&self, batch: &[Arc<LogRecord>]) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Succeed => {
                self.batches.lock().unwrap().push(batch.to_vec());
                Ok(())
            }
            Mode::Retryable => Err(TransportError::Retryable("503 service unavailable".into())),
            Mode::NonRetryable => Err(TransportError::NonRetryable("401 unauthorized".into())),
        }
    }
}

/// Options with a timer long enough that only explicit or threshold
/// flushes run during a test.
pub fn options() -> ClientOptions {
    ClientOptions {
        batch_size: 5,
        flush_interval: Duration::from_secs(3600),
        max_buffer_size: 100,
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
        circuit_breaker_threshold: 3,
        circuit_breaker_reset: Duration::from_secs(30),
        ..ClientOptions::new("http://localhost:8080", "lp_test")
    }
}
