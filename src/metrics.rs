use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub logs_sent: u64,
    pub logs_dropped: u64,
    pub errors: u64,
    pub retries: u64,
    pub circuit_breaker_trips: u64,
    pub avg_latency_ms: f64,
}

/// Counters shared by the buffer, breaker and delivery engine.
///
/// One instance is created per client and handed to every component by
/// `Arc`. Each counter is an independent atomic; when metrics are disabled
/// every update is a no-op.
#[derive(Debug)]
pub struct Metrics {
    enabled: bool,
    logs_sent: AtomicU64,
    logs_dropped: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    circuit_breaker_trips: AtomicU64,
    latency_total_micros: AtomicU64,
    latency_samples: AtomicU64,
}

impl Metrics {
    pub fn new(enabled: bool) -> Self {
        Metrics {
            enabled,
            logs_sent: AtomicU64::new(0),
            logs_dropped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            circuit_breaker_trips: AtomicU64::new(0),
            latency_total_micros: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn add_sent(&self, n: u64) {
        self.add(&self.logs_sent, n);
    }

    pub fn add_dropped(&self, n: u64) {
        self.add(&self.logs_dropped, n);
    }

    pub fn add_error(&self) {
        self.add(&self.errors, 1);
    }

    pub fn add_retry(&self) {
        self.add(&self.retries, 1);
    }

    pub fn add_circuit_breaker_trip(&self) {
        self.add(&self.circuit_breaker_trips, 1);
    }

    /// Fold one successful transport round-trip into the running average.
    pub fn record_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.add(&self.latency_total_micros, micros);
        self.add(&self.latency_samples, 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let total = self.latency_total_micros.load(Ordering::Relaxed);
        let avg_latency_ms = if samples == 0 {
            0.0
        } else {
            total as f64 / samples as f64 / 1000.0
        };

        MetricsSnapshot {
            logs_sent: self.logs_sent.load(Ordering::Relaxed),
            logs_dropped: self.logs_dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            circuit_breaker_trips: self.circuit_breaker_trips.load(Ordering::Relaxed),
            avg_latency_ms,
        }
    }

    /// Zero every counter. Buffer contents and breaker state are owned
    /// elsewhere and are not touched.
    pub fn reset(&self) {
        for counter in [
            &self.logs_sent,
            &self.logs_dropped,
            &self.errors,
            &self.retries,
            &self.circuit_breaker_trips,
            &self.latency_total_micros,
            &self.latency_samples,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn add(&self, counter: &AtomicU64, n: u64) {
        if self.enabled {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }
}
