//! Rolling error history per extraction method
//!
//! Keeps the most recent errors across all methods and decides when a
//! method has failed often enough, with one class of error, that it should
//! be skipped outright.

use crate::extraction::ExtractionMethod;
use std::collections::VecDeque;
use std::time::Duration;

/// Number of recent errors remembered
pub const HISTORY_WINDOW: usize = 20;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Coarse error classification used for skip and backoff decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Timeout,
    Network,
    RateLimited,
    Parse,
    Blocked,
    Other,
}

impl ErrorClass {
    fn base_delay(&self) -> Duration {
        match self {
            Self::Timeout => Duration::from_secs(2),
            Self::Network => Duration::from_secs(1),
            Self::RateLimited => Duration::from_secs(5),
            Self::Parse => Duration::from_millis(500),
            Self::Blocked => Duration::from_secs(5),
            Self::Other => Duration::from_secs(1),
        }
    }
}

/// Failures of one class a method may accumulate before it is skipped.
///
/// AI analysis is slow and costly, and a backend that times out or rate
/// limits rarely recovers within a run. The local methods are cheap.
pub fn skip_threshold(method: ExtractionMethod, class: ErrorClass) -> usize {
    match (method, class) {
        (ExtractionMethod::Ai, ErrorClass::Timeout | ErrorClass::RateLimited) => 2,
        (ExtractionMethod::Ai, _) => 3,
        (ExtractionMethod::Keyword, _) => 4,
        (ExtractionMethod::Legacy, _) | (ExtractionMethod::None, _) => 5,
    }
}

/// Backoff before retry `attempt` (0-based) for an error class:
/// `base × 1.5^attempt` plus up to 10% jitter, capped at 10s
pub fn backoff_delay(class: ErrorClass, attempt: u32) -> Duration {
    let base = class.base_delay().mul_f64(1.5f64.powi(attempt as i32));
    let jittered = base + base.mul_f64(fastrand::f64() * 0.1);
    jittered.min(MAX_BACKOFF)
}

#[derive(Debug, Default)]
pub struct MethodErrorHistory {
    entries: VecDeque<(ExtractionMethod, ErrorClass)>,
}

impl MethodErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers an error, evicting the oldest once the window is full
    pub fn record_error(&mut self, method: ExtractionMethod, class: ErrorClass) {
        if self.entries.len() == HISTORY_WINDOW {
            self.entries.pop_front();
        }
        self.entries.push_back((method, class));
    }

    /// A success clears the method's recorded errors
    pub fn record_success(&mut self, method: ExtractionMethod) {
        self.entries.retain(|(m, _)| *m != method);
    }

    pub fn failures(&self, method: ExtractionMethod, class: ErrorClass) -> usize {
        self.entries
            .iter()
            .filter(|(m, c)| *m == method && *c == class)
            .count()
    }

    /// True once any single error class exceeds the method's threshold
    pub fn should_skip(&self, method: ExtractionMethod) -> bool {
        [
            ErrorClass::Timeout,
            ErrorClass::Network,
            ErrorClass::RateLimited,
            ErrorClass::Parse,
            ErrorClass::Blocked,
            ErrorClass::Other,
        ]
        .into_iter()
        .any(|class| self.failures(method, class) > skip_threshold(method, class))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
