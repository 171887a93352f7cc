use crate::breaker::OperationType;
use crate::config::BreakerOverride;
use std::time::Duration;

/// Tuning for one circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures in CLOSED that trip the breaker
    pub failure_threshold: u32,
    /// Time spent OPEN before a trial call is allowed
    pub recovery_timeout: Duration,
    /// Consecutive HALF_OPEN successes needed to close again
    pub success_threshold: u32,
    /// Bound on each individual attempt
    pub request_timeout: Duration,
    /// Extra attempts after the first one fails
    pub max_retries: u32,
    /// Base pause between attempts
    pub retry_delay: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 3,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(1500),
        }
    }
}

impl BreakerConfig {
    /// Tuned preset for an operation type; fields a preset does not tune
    /// keep the defaults
    pub fn for_operation(operation: OperationType) -> Self {
        let base = Self::default();
        let secs = Duration::from_secs;

        match operation {
            OperationType::ElementInteraction => Self {
                failure_threshold: 15,
                recovery_timeout: secs(10),
                ..base
            },
            OperationType::PageLoad => Self {
                failure_threshold: 5,
                recovery_timeout: secs(30),
                request_timeout: secs(45),
                ..base
            },
            OperationType::ScriptExecution => Self {
                failure_threshold: 10,
                recovery_timeout: secs(15),
                ..base
            },
            OperationType::SearchInteraction => Self {
                failure_threshold: 15,
                recovery_timeout: secs(20),
                ..base
            },
            OperationType::MapInteraction => Self {
                failure_threshold: 25,
                recovery_timeout: secs(25),
                ..base
            },
            OperationType::UrlVerification => Self {
                failure_threshold: 3,
                recovery_timeout: secs(5),
                request_timeout: secs(8),
                ..base
            },
            OperationType::AiContentAnalysis => Self {
                failure_threshold: 5,
                recovery_timeout: secs(120),
                request_timeout: secs(120),
                ..base
            },
            OperationType::Other => base,
        }
    }

    /// Applies the fields set in a config-file override
    pub fn with_override(mut self, o: &BreakerOverride) -> Self {
        if let Some(v) = o.failure_threshold {
            self.failure_threshold = v;
        }
        if let Some(v) = o.recovery_timeout_secs {
            self.recovery_timeout = Duration::from_secs_f64(v);
        }
        if let Some(v) = o.success_threshold {
            self.success_threshold = v;
        }
        if let Some(v) = o.request_timeout_secs {
            self.request_timeout = Duration::from_secs_f64(v);
        }
        if let Some(v) = o.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = o.retry_delay_secs {
            self.retry_delay = Duration::from_secs_f64(v);
        }
        self
    }
}
