//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::extraction::{ExtractionMethod, ExtractionResult, ScheduleType};
use crate::frontier::{CrawlCandidate, KeywordRecord};
use crate::gate::BlockingAssessment;
use crate::storage::{RunRecord, RunStatus, SiteRecord};
use crate::tracker::{GoldenUrl, QualityScore, VisitResult};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Site not found: {0}")]
    SiteNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes take `&mut self`; callers share a backend through
/// [`SharedStorage`](crate::storage::SharedStorage).
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status of a run and stamps its finish time
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Sites =====

    fn upsert_site(&mut self, site: &SiteRecord) -> StorageResult<()>;

    fn get_site(&self, site_id: i64) -> StorageResult<SiteRecord>;

    /// All sites ordered by ID
    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>>;

    // ===== Crawl Candidates =====

    /// Inserts a candidate or raises its priority if already known
    fn upsert_candidate(&mut self, candidate: &CrawlCandidate) -> StorageResult<()>;

    fn mark_candidate_visited(&mut self, site_id: i64, url: &str) -> StorageResult<()>;

    fn candidates_for_site(&self, site_id: i64) -> StorageResult<Vec<CrawlCandidate>>;

    // ===== Visits =====

    /// Records a fetch outcome; a later visit of the same URL replaces it
    fn record_visit(&mut self, visit: &VisitResult) -> StorageResult<()>;

    fn visits_for_site(&self, site_id: i64) -> StorageResult<Vec<VisitResult>>;

    // ===== Extraction Results =====

    /// Upserts on (site_id, schedule_type)
    fn upsert_extraction(&mut self, result: &ExtractionResult) -> StorageResult<()>;

    fn get_extraction(
        &self,
        site_id: i64,
        schedule_type: ScheduleType,
    ) -> StorageResult<Option<ExtractionResult>>;

    fn list_extractions(&self) -> StorageResult<Vec<ExtractionResult>>;

    // ===== Blocking =====

    /// Replaces the site's stored root assessment
    fn save_blocking_assessment(
        &mut self,
        site_id: i64,
        assessment: &BlockingAssessment,
    ) -> StorageResult<()>;

    fn get_blocking_assessment(&self, site_id: i64) -> StorageResult<Option<BlockingAssessment>>;

    // ===== Golden URLs =====

    fn record_golden_url(&mut self, golden: &GoldenUrl) -> StorageResult<()>;

    /// Golden URLs for a site, highest confidence first
    fn golden_urls(&self, site_id: i64) -> StorageResult<Vec<GoldenUrl>>;

    // ===== Keywords =====

    fn insert_keyword(&mut self, keyword: &KeywordRecord) -> StorageResult<()>;

    fn load_keywords(&self) -> StorageResult<Vec<KeywordRecord>>;

    // ===== Statistics =====

    fn count_sites(&self) -> StorageResult<u64>;

    fn count_visits_by_quality(&self) -> StorageResult<HashMap<QualityScore, u64>>;

    fn count_blocked_sites(&self) -> StorageResult<u64>;

    fn count_extractions_by_method(&self) -> StorageResult<HashMap<ExtractionMethod, u64>>;
}
