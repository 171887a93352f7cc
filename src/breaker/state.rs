//! Circuit breaker state machine
//!
//! ```text
//! CLOSED --failure_threshold failures--> OPEN
//! OPEN --recovery_timeout elapsed, one trial--> HALF_OPEN
//! HALF_OPEN --success_threshold successes--> CLOSED
//! HALF_OPEN --any failure--> OPEN (timer restarts)
//! ```
//!
//! The transition methods take an explicit `now` so the machine can be
//! driven deterministically in tests.

use crate::breaker::{BreakerConfig, BreakerError, OperationType};
use serde::Serialize;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Start of the HALF_OPEN trial currently in flight
    trial_started_at: Option<Instant>,
}

/// Point-in-time view of a breaker, for logging and reports
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub operation_type: OperationType,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// Circuit breaker guarding one operation type
#[derive(Debug)]
pub struct CircuitBreaker {
    operation: OperationType,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(operation: OperationType, config: BreakerConfig) -> Self {
        Self {
            operation,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                trial_started_at: None,
            }),
        }
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            operation_type: self.operation,
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
        }
    }

    /// Asks permission for one guarded operation
    ///
    /// Returns false when the call must be rejected without any I/O.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                if now.saturating_duration_since(opened_at) < self.config.recovery_timeout {
                    return false;
                }
                tracing::info!(operation = %self.operation, "Circuit half-open, allowing trial call");
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                inner.trial_started_at = Some(now);
                true
            }
            CircuitState::HalfOpen => {
                // One trial at a time; a trial whose caller vanished without
                // reporting is abandoned after a recovery period
                let abandoned = inner.trial_started_at.map_or(true, |started| {
                    now.saturating_duration_since(started) >= self.config.recovery_timeout
                });
                if abandoned {
                    inner.trial_started_at = Some(now);
                }
                abandoned
            }
        }
    }

    /// Reports a successful guarded operation
    pub fn record_success(&self, _now: Instant) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                inner.trial_started_at = None;
                if inner.consecutive_successes >= self.config.success_threshold {
                    tracing::info!(operation = %self.operation, "Circuit closed");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Reports a failed guarded operation
    pub fn record_failure(&self, now: Instant) {
        let mut inner = self.lock();
        inner.consecutive_successes = 0;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        operation = %self.operation,
                        failures = inner.consecutive_failures,
                        "Circuit opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(operation = %self.operation, "Trial call failed, circuit re-opened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trial_started_at = None;
            }
            CircuitState::Open => {
                inner.opened_at = Some(now);
            }
        }
    }

    fn retry_pause(&self) -> Duration {
        let delay = self.config.retry_delay;
        delay + delay.mul_f64(fastrand::f64() * 0.1)
    }

    /// Runs `op` under this breaker
    ///
    /// An OPEN breaker rejects immediately without calling `op`. Otherwise
    /// each attempt is bounded by `request_timeout` and failed attempts are
    /// retried up to `max_retries` times. Only the overall outcome updates
    /// the counters.
    pub async fn call<T, E, F, Fut>(&self, mut op: F) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire(Instant::now()) {
            tracing::debug!(operation = %self.operation, "Circuit open, call rejected");
            return Err(BreakerError::Open(self.operation));
        }

        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.config.request_timeout, op()).await {
                Ok(Ok(value)) => {
                    self.record_success(Instant::now());
                    return Ok(value);
                }
                Ok(Err(e)) => BreakerError::Failed(e),
                Err(_) => BreakerError::Timeout {
                    operation: self.operation,
                    after: self.config.request_timeout,
                },
            };

            if attempt >= self.config.max_retries {
                self.record_failure(Instant::now());
                return Err(error);
            }

            attempt += 1;
            let pause = self.retry_pause();
            tracing::debug!(
                operation = %self.operation,
                attempt,
                delay_ms = pause.as_millis() as u64,
                "Retrying guarded operation"
            );
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(10),
            success_threshold: 2,
            request_timeout: Duration::from_millis(200),
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(OperationType::Other, test_config())
    }

    fn trip(b: &CircuitBreaker, now: Instant) {
        for _ in 0..3 {
            assert!(b.try_acquire(now));
            b.record_failure(now);
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let b = breaker();
        let now = Instant::now();

        for _ in 0..2 {
            assert!(b.try_acquire(now));
            b.record_failure(now);
            assert_eq!(b.state(), CircuitState::Closed);
        }
        assert!(b.try_acquire(now));
        b.record_failure(now);

        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.try_acquire(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let b = breaker();
        let now = Instant::now();
        b.record_failure(now);
        b.record_failure(now);
        b.record_success(now);
        b.record_failure(now);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn test_half_open_allows_exactly_one_trial() {
        let b = breaker();
        let t0 = Instant::now();
        trip(&b, t0);

        let t1 = t0 + Duration::from_secs(10);
        assert!(b.try_acquire(t1));
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(!b.try_acquire(t1));
        assert!(!b.try_acquire(t1 + Duration::from_secs(1)));
    }

    #[test]
    fn test_half_open_closes_after_successes() {
        let b = breaker();
        let t0 = Instant::now();
        trip(&b, t0);

        let t1 = t0 + Duration::from_secs(11);
        assert!(b.try_acquire(t1));
        b.record_success(t1);
        assert_eq!(b.state(), CircuitState::HalfOpen);

        assert!(b.try_acquire(t1));
        b.record_success(t1);
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_acquire(t1));
    }

    #[test]
    fn test_half_open_failure_reopens_and_restarts_timer() {
        let b = breaker();
        let t0 = Instant::now();
        trip(&b, t0);

        let t1 = t0 + Duration::from_secs(10);
        assert!(b.try_acquire(t1));
        b.record_failure(t1);
        assert_eq!(b.state(), CircuitState::Open);

        // Timer counts from the trial failure, not the original trip
        assert!(!b.try_acquire(t1 + Duration::from_secs(9)));
        assert!(b.try_acquire(t1 + Duration::from_secs(10)));
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_open_breaker_performs_no_io() {
        let b = breaker();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result: Result<(), BreakerError<&str>> = b
                .call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("boom")
                })
                .await;
            assert!(matches!(result, Err(BreakerError::Failed("boom"))));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let result: Result<(), BreakerError<&str>> = b
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open(OperationType::Other))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_count_as_one_outcome() {
        let config = BreakerConfig {
            max_retries: 2,
            ..test_config()
        };
        let b = CircuitBreaker::new(OperationType::Other, config);
        let calls = AtomicU32::new(0);

        let result: Result<(), BreakerError<&str>> = b
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("flaky")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(b.snapshot().consecutive_failures, 1);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let config = BreakerConfig {
            max_retries: 2,
            ..test_config()
        };
        let b = CircuitBreaker::new(OperationType::Other, config);
        let calls = AtomicU32::new(0);

        let result: Result<u32, BreakerError<&str>> = b
            .call(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err("first attempt fails")
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(b.snapshot().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let b = breaker();
        let result: Result<(), BreakerError<&str>> = b
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Timeout { .. })));
    }
}
