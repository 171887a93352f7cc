//! Structured lifecycle events
//!
//! Sessions report start, per-page progress, each saved fact, completion
//! and errors through an [`EventSink`]. The default sink mirrors events to
//! `tracing`; [`StalenessMonitor`] watches them for sites that went quiet.

mod monitor;

pub use monitor::StalenessMonitor;

use crate::extraction::{ExtractionMethod, ScheduleType};
use crate::gate::BlockingType;
use crate::tracker::QualityScore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One lifecycle event of a site session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SiteStarted {
        site_id: i64,
        base_url: String,
        page_budget: u32,
        at: DateTime<Utc>,
    },
    PageProgress {
        site_id: i64,
        url: String,
        pages_visited: u32,
        page_budget: u32,
        quality: QualityScore,
        at: DateTime<Utc>,
    },
    FactSaved {
        site_id: i64,
        schedule_type: ScheduleType,
        method: ExtractionMethod,
        confidence: u8,
        at: DateTime<Utc>,
    },
    SiteCompleted {
        site_id: i64,
        pages_visited: u32,
        blocked: Option<BlockingType>,
        facts_found: usize,
        at: DateTime<Utc>,
    },
    SiteError {
        site_id: i64,
        message: String,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn site_id(&self) -> i64 {
        match self {
            Self::SiteStarted { site_id, .. }
            | Self::PageProgress { site_id, .. }
            | Self::FactSaved { site_id, .. }
            | Self::SiteCompleted { site_id, .. }
            | Self::SiteError { site_id, .. } => *site_id,
        }
    }

    /// Completion and error end a site's session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SiteCompleted { .. } | Self::SiteError { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SiteStarted { .. } => "site_started",
            Self::PageProgress { .. } => "page_progress",
            Self::FactSaved { .. } => "fact_saved",
            Self::SiteCompleted { .. } => "site_completed",
            Self::SiteError { .. } => "site_error",
        }
    }
}

/// Receives lifecycle events; must not block
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Mirrors events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        match &event {
            LifecycleEvent::SiteError { .. } => tracing::warn!(
                target: "schedule_scout::events",
                site_id = event.site_id(),
                event = event.name(),
                %payload
            ),
            LifecycleEvent::PageProgress { .. } => tracing::debug!(
                target: "schedule_scout::events",
                site_id = event.site_id(),
                event = event.name(),
                %payload
            ),
            _ => tracing::info!(
                target: "schedule_scout::events",
                site_id = event.site_id(),
                event = event.name(),
                %payload
            ),
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: LifecycleEvent) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Sends every event to several sinks
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: LifecycleEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(site_id: i64) -> LifecycleEvent {
        LifecycleEvent::SiteStarted {
            site_id,
            base_url: "https://stmary.org".to_string(),
            page_budget: 50,
            at: Utc::now(),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let value = serde_json::to_value(started(4)).unwrap();
        assert_eq!(value["type"], "site_started");
        assert_eq!(value["site_id"], 4);
        assert_eq!(value["page_budget"], 50);
    }

    #[test]
    fn test_blocked_completion_serializes_type() {
        let event = LifecycleEvent::SiteCompleted {
            site_id: 2,
            pages_visited: 1,
            blocked: Some(BlockingType::Forbidden403),
            facts_found: 0,
            at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["blocked"], "forbidden_403");
        assert!(event.is_terminal());
    }

    #[tokio::test]
    async fn test_channel_and_fanout() {
        let (first, mut rx1) = ChannelSink::new();
        let (second, mut rx2) = ChannelSink::new();
        let fanout = FanoutSink::new(vec![Arc::new(first), Arc::new(second)]);

        fanout.emit(started(9));
        assert_eq!(rx1.recv().await.unwrap().site_id(), 9);
        assert_eq!(rx2.recv().await.unwrap().site_id(), 9);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(started(1));
    }
}
