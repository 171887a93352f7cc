//! Visit tracking and golden-URL feedback
//!
//! Every fetch attempt becomes a [`VisitResult`], successful or not. Writes
//! that fail are kept and retried by the session's final batch save, so a
//! flaky store never stops a crawl.

mod quality;

pub use quality::{score_content, weighted_keyword_score, QualityScore};

use crate::extraction::ScheduleType;
use crate::storage::{lock_storage, SharedStorage, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one fetch attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitResult {
    pub site_id: i64,
    pub url: String,
    pub visited_at: DateTime<Utc>,
    pub http_status: Option<u16>,
    pub response_time_ms: u64,
    pub content_type: Option<String>,
    pub content_size: u64,
    pub extraction_attempted: bool,
    pub extraction_success: bool,
    pub schedule_data_found: bool,
    pub quality_score: QualityScore,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl VisitResult {
    /// A visit that produced no assessable content
    pub fn failed(
        site_id: i64,
        url: &str,
        error_type: &str,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            site_id,
            url: url.to_string(),
            visited_at: Utc::now(),
            http_status: None,
            response_time_ms: 0,
            content_type: None,
            content_size: 0,
            extraction_attempted: false,
            extraction_success: false,
            schedule_data_found: false,
            quality_score: QualityScore::Error,
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.quality_score == QualityScore::Error
    }
}

/// A source URL that once yielded a high-confidence result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenUrl {
    pub site_id: i64,
    pub schedule_type: ScheduleType,
    pub url: String,
    pub confidence: u8,
    pub recorded_at: DateTime<Utc>,
}

/// Loads a site's golden URLs, best first
pub fn load_golden_urls(storage: &SharedStorage, site_id: i64) -> StorageResult<Vec<GoldenUrl>> {
    lock_storage(storage)?.golden_urls(site_id)
}

/// Per-session recorder for visits and golden URLs
pub struct VisitTracker {
    site_id: i64,
    storage: SharedStorage,
    visits: Vec<VisitResult>,
    unsaved_visits: Vec<VisitResult>,
    unsaved_golden: Vec<GoldenUrl>,
}

impl VisitTracker {
    pub fn new(site_id: i64, storage: SharedStorage) -> Self {
        Self {
            site_id,
            storage,
            visits: Vec::new(),
            unsaved_visits: Vec::new(),
            unsaved_golden: Vec::new(),
        }
    }

    pub fn site_id(&self) -> i64 {
        self.site_id
    }

    /// Records a visit, keeping it for the batch save if the write fails
    pub fn record(&mut self, visit: VisitResult) {
        tracing::debug!(
            site_id = self.site_id,
            url = %visit.url,
            status = ?visit.http_status,
            quality = %visit.quality_score,
            "Visit recorded"
        );

        let saved = lock_storage(&self.storage).and_then(|mut s| s.record_visit(&visit));
        if let Err(e) = saved {
            tracing::warn!(site_id = self.site_id, url = %visit.url, error = %e, "Failed to persist visit");
            self.unsaved_visits.push(visit.clone());
        }
        self.visits.push(visit);
    }

    /// Remembers a high-confidence source URL for future sessions
    pub fn record_golden(&mut self, schedule_type: ScheduleType, url: &str, confidence: u8) {
        let golden = GoldenUrl {
            site_id: self.site_id,
            schedule_type,
            url: url.to_string(),
            confidence,
            recorded_at: Utc::now(),
        };
        tracing::info!(
            site_id = self.site_id,
            schedule_type = %schedule_type,
            url = %url,
            confidence,
            "Golden URL recorded"
        );

        let saved = lock_storage(&self.storage).and_then(|mut s| s.record_golden_url(&golden));
        if let Err(e) = saved {
            tracing::warn!(site_id = self.site_id, error = %e, "Failed to persist golden URL");
            self.unsaved_golden.push(golden);
        }
    }

    pub fn visits(&self) -> &[VisitResult] {
        &self.visits
    }

    /// Number of fetch attempts recorded this session
    pub fn attempts(&self) -> usize {
        self.visits.len()
    }

    pub fn unsaved(&self) -> usize {
        self.unsaved_visits.len() + self.unsaved_golden.len()
    }

    /// Retries every write that failed earlier
    ///
    /// # Returns
    ///
    /// Number of visits and golden URLs still unsaved
    pub fn flush(&mut self) -> usize {
        let Ok(mut storage) = lock_storage(&self.storage) else {
            return self.unsaved();
        };
        self.unsaved_visits.retain(|v| storage.record_visit(v).is_err());
        self.unsaved_golden.retain(|g| storage.record_golden_url(g).is_err());
        drop(storage);
        self.unsaved()
    }
}
