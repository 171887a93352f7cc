//! Circuit breakers for every class of outbound operation
//!
//! Each [`OperationType`] has its own tuned [`BreakerConfig`]. A
//! [`BreakerRegistry`] hands out one shared [`CircuitBreaker`] per operation
//! type; the crawler keeps either one registry for the whole process or one
//! per site, depending on `crawler.breaker-scope`.

mod config;
mod history;
mod state;

pub use config::BreakerConfig;
pub use history::{backoff_delay, skip_threshold, ErrorClass, MethodErrorHistory, HISTORY_WINDOW};
pub use state::{BreakerSnapshot, CircuitBreaker, CircuitState};

use crate::config::BreakerOverride;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Classes of outbound operation, each with its own breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    ElementInteraction,
    PageLoad,
    ScriptExecution,
    SearchInteraction,
    MapInteraction,
    UrlVerification,
    AiContentAnalysis,
    Other,
}

impl OperationType {
    pub const ALL: [OperationType; 8] = [
        Self::ElementInteraction,
        Self::PageLoad,
        Self::ScriptExecution,
        Self::SearchInteraction,
        Self::MapInteraction,
        Self::UrlVerification,
        Self::AiContentAnalysis,
        Self::Other,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ElementInteraction => "element-interaction",
            Self::PageLoad => "page-load",
            Self::ScriptExecution => "script-execution",
            Self::SearchInteraction => "search-interaction",
            Self::MapInteraction => "map-interaction",
            Self::UrlVerification => "url-verification",
            Self::AiContentAnalysis => "ai-content-analysis",
            Self::Other => "other",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure of a breaker-guarded call
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker was OPEN; no I/O was attempted
    #[error("circuit open for {0}")]
    Open(OperationType),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: OperationType,
        after: Duration,
    },

    #[error("{0}")]
    Failed(E),
}

/// Hands out one breaker per operation type
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<OperationType, Arc<CircuitBreaker>>>,
    overrides: HashMap<String, BreakerOverride>,
}

impl BreakerRegistry {
    /// Creates a registry applying config-file overrides on top of the presets
    pub fn new(overrides: HashMap<String, BreakerOverride>) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            overrides,
        }
    }

    /// A registry with the same tuning but independent counters
    pub fn fresh(&self) -> Self {
        Self::new(self.overrides.clone())
    }

    pub fn config_for(&self, operation: OperationType) -> BreakerConfig {
        let preset = BreakerConfig::for_operation(operation);
        match self.overrides.get(operation.name()) {
            Some(o) => preset.with_override(o),
            None => preset,
        }
    }

    pub fn get(&self, operation: OperationType) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(operation)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(operation, self.config_for(operation))))
            .clone()
    }

    /// Snapshots of every breaker created so far
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        let mut snaps: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        snaps.sort_by_key(|s| s.operation_type.name());
        snaps
    }
}
