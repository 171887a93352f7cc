//! Per-origin rate limiting
//!
//! Every origin owns an async mutex around its last-request timestamp.
//! A caller holds that mutex while it sleeps out the remaining delay, so
//! concurrent workers hitting the same origin are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Request bookkeeping for one origin
#[derive(Debug, Clone, Default)]
pub struct OriginState {
    /// Number of requests made to this origin
    pub request_count: u32,

    /// Timestamp of the last request to this origin
    pub last_request_time: Option<Instant>,
}

impl OriginState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a request can be made now given the minimum delay
    pub fn can_request(&self, min_delay: Duration, now: Instant) -> bool {
        self.time_until_next_request(min_delay, now).is_none()
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < min_delay).then(|| min_delay - elapsed)
    }

    /// Records that a request was made to this origin
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }
}

/// Shared per-origin rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    origins: Mutex<HashMap<String, Arc<tokio::sync::Mutex<OriginState>>>>,
    default_delay: Duration,
    max_jitter: Duration,
}

impl RateLimiter {
    /// Creates a limiter with the delay used when robots.txt sets none and
    /// the upper bound of the random jitter added to every delay
    pub fn new(default_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            origins: Mutex::new(HashMap::new()),
            default_delay,
            max_jitter,
        }
    }

    /// Minimum spacing for an origin: robots crawl-delay when present, else the default
    pub fn base_delay(&self, crawl_delay: Option<f64>) -> Duration {
        crawl_delay
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_delay)
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        self.max_jitter.mul_f64(fastrand::f64())
    }

    fn slot(&self, origin: &str) -> Arc<tokio::sync::Mutex<OriginState>> {
        let mut origins = self.origins.lock().unwrap_or_else(|e| e.into_inner());
        origins
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(OriginState::new())))
            .clone()
    }

    /// Waits until a request to `origin` respects the delay, then records it
    ///
    /// Returns how long the caller slept.
    pub async fn wait_turn(&self, origin: &str, crawl_delay: Option<f64>) -> Duration {
        let slot = self.slot(origin);
        let mut state = slot.lock().await;

        let min_delay = self.base_delay(crawl_delay) + self.jitter();
        let waited = state
            .time_until_next_request(min_delay, Instant::now())
            .unwrap_or(Duration::ZERO);

        if !waited.is_zero() {
            tracing::trace!(origin, wait_ms = waited.as_millis() as u64, "Respecting crawl delay");
            tokio::time::sleep(waited).await;
        }

        state.record_request(Instant::now());
        waited
    }

    /// Number of requests recorded for an origin
    pub fn request_count(&self, origin: &str) -> u32 {
        let origins = self.origins.lock().unwrap_or_else(|e| e.into_inner());
        origins
            .get(origin)
            .and_then(|slot| slot.try_lock().ok().map(|s| s.request_count))
            .unwrap_or(0)
    }
}
