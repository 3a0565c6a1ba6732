//! Failure gate in front of the transport.

use crate::metrics::Metrics;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed deliveries that open the circuit.
    pub failure_threshold: u32,
    /// Cooldown after a trip before a probe is allowed.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
#[error("circuit breaker is {state}, delivery rejected")]
pub struct CircuitOpenError {
    pub state: CircuitState,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_transition: Instant,
    probe_in_flight: bool,
}

/// Consecutive-failure circuit breaker.
///
/// Callers ask [`CircuitBreaker::try_acquire`] before each delivery and
/// report the outcome with [`record_success`](CircuitBreaker::record_success)
/// or [`record_failure`](CircuitBreaker::record_failure). While half-open
/// only the caller that moved the breaker out of `Open` gets through.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics: Arc<Metrics>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                reset_timeout: config.reset_timeout,
            },
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_transition: Instant::now(),
                probe_in_flight: false,
            }),
            metrics,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Admit or reject one delivery attempt.
    pub fn try_acquire(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.lock();
        let now = Instant::now();
        let state = inner.state;

        match state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                if now.duration_since(inner.last_transition) >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_transition = now;
                    inner.probe_in_flight = true;
                    info!(state = %CircuitState::HalfOpen, "circuit breaker admitting probe");
                    Ok(())
                } else {
                    Err(CircuitOpenError { state: CircuitState::Open })
                }
            }
            CircuitState::HalfOpen => {
                // A probe whose outcome never came back must not wedge the breaker.
                let stale = now.duration_since(inner.last_transition) >= self.config.reset_timeout;
                if inner.probe_in_flight && !stale {
                    Err(CircuitOpenError { state: CircuitState::HalfOpen })
                } else {
                    inner.last_transition = now;
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        if inner.state != CircuitState::Closed {
            inner.state = CircuitState::Closed;
            inner.last_transition = Instant::now();
            info!(state = %CircuitState::Closed, "circuit breaker closed");
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let failures = inner.consecutive_failures;
        let state = inner.state;

        match state {
            CircuitState::HalfOpen => {
                self.trip(&mut inner);
                warn!(failures, "circuit breaker probe failed, reopening");
            }
            CircuitState::Closed if failures >= self.config.failure_threshold => {
                self.trip(&mut inner);
                error!(
                    failures,
                    reset_ms = self.config.reset_timeout.as_millis() as u64,
                    "circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.last_transition = Instant::now();
        inner.probe_in_flight = false;
        self.metrics.add_circuit_breaker_trip();
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn breaker(threshold: u32, reset: Duration) -> (CircuitBreaker, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new(true));
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: reset,
            },
            Arc::clone(&metrics),
        );
        (cb, metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn opens_exactly_at_threshold() {
        let (cb, metrics) = breaker(3, Duration::from_secs(10));

        for _ in 0..2 {
            assert!(cb.try_acquire().is_ok());
            cb.record_failure();
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure();

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(metrics.snapshot().circuit_breaker_trips, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_streak() {
        let (cb, _) = breaker(2, Duration::from_secs(10));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_until_reset_elapses() {
        let (cb, _) = breaker(1, Duration::from_secs(10));
        cb.record_failure();

        sleep(Duration::from_secs(9)).await;
        let err = cb.try_acquire().unwrap_err();
        assert_eq!(err.state, CircuitState::Open);

        sleep(Duration::from_secs(1)).await;
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_a_single_probe() {
        let (cb, _) = breaker(1, Duration::from_secs(5));
        cb.record_failure();
        sleep(Duration::from_secs(5)).await;

        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_err());
        assert!(cb.try_acquire().is_err());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_and_restarts_cooldown() {
        let (cb, metrics) = breaker(1, Duration::from_secs(5));
        cb.record_failure();
        sleep(Duration::from_secs(5)).await;

        assert!(cb.try_acquire().is_ok());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(metrics.snapshot().circuit_breaker_trips, 2);

        sleep(Duration::from_secs(4)).await;
        assert!(cb.try_acquire().is_err());
        sleep(Duration::from_secs(1)).await;
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_probe_is_superseded_after_cooldown() {
        let (cb, _) = breaker(1, Duration::from_secs(5));
        cb.record_failure();
        sleep(Duration::from_secs(5)).await;
        assert!(cb.try_acquire().is_ok());

        sleep(Duration::from_secs(5)).await;
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"HALF_OPEN\""
        );
    }
}
