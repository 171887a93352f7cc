//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::extraction::{ExtractionMethod, ExtractionResult, ScheduleType};
use crate::frontier::{CrawlCandidate, KeywordRecord, KeywordScope};
use crate::gate::{BlockingAssessment, BlockingType, RobotsDecision};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, SiteRecord};
use crate::tracker::{GoldenUrl, QualityScore, VisitResult};
use crate::ScoutError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ScoutError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ScoutError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, ScoutError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(idx, &raw)
}

fn schedule_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ScheduleType> {
    let raw: String = row.get(idx)?;
    ScheduleType::from_db_string(&raw)
        .ok_or_else(|| conversion_error(idx, format!("unknown schedule type: {}", raw)))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let finished: Option<String> = row.get(2)?;
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: timestamp_at(row, 1)?,
        finished_at: finished.map(|f| parse_timestamp(2, &f)).transpose()?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        group: row.get(3)?,
    })
}

fn extraction_from_row(row: &Row<'_>) -> rusqlite::Result<ExtractionResult> {
    let method: String = row.get(2)?;
    Ok(ExtractionResult {
        site_id: row.get(0)?,
        schedule_type: schedule_type_at(row, 1)?,
        method: ExtractionMethod::from_db_string(&method)
            .ok_or_else(|| conversion_error(2, format!("unknown method: {}", method)))?,
        confidence: row.get(3)?,
        schedule_text: row.get(4)?,
        source_url: row.get(5)?,
        extracted_at: timestamp_at(row, 6)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Sites =====

    fn upsert_site(&mut self, site: &SiteRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sites (id, name, base_url, site_group, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                base_url = excluded.base_url,
                site_group = excluded.site_group,
                updated_at = excluded.updated_at",
            params![site.id, site.name, site.base_url, site.group, now],
        )?;
        Ok(())
    }

    fn get_site(&self, site_id: i64) -> StorageResult<SiteRecord> {
        self.conn
            .query_row(
                "SELECT id, name, base_url, site_group FROM sites WHERE id = ?1",
                params![site_id],
                site_from_row,
            )
            .optional()?
            .ok_or(StorageError::SiteNotFound(site_id))
    }

    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, base_url, site_group FROM sites ORDER BY id")?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    // ===== Crawl Candidates =====

    fn upsert_candidate(&mut self, candidate: &CrawlCandidate) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_candidates
                (site_id, url, priority_score, source_url, discovered_at, visited)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(site_id, url) DO UPDATE SET
                priority_score = MAX(priority_score, excluded.priority_score),
                visited = MAX(visited, excluded.visited)",
            params![
                candidate.site_id,
                candidate.url,
                candidate.priority_score,
                candidate.source_url,
                candidate.discovered_at.to_rfc3339(),
                candidate.visited,
            ],
        )?;
        Ok(())
    }

    fn mark_candidate_visited(&mut self, site_id: i64, url: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE crawl_candidates SET visited = 1 WHERE site_id = ?1 AND url = ?2",
            params![site_id, url],
        )?;
        Ok(())
    }

    fn candidates_for_site(&self, site_id: i64) -> StorageResult<Vec<CrawlCandidate>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, url, priority_score, source_url, discovered_at, visited
             FROM crawl_candidates WHERE site_id = ?1
             ORDER BY priority_score DESC, id ASC",
        )?;
        let candidates = stmt
            .query_map(params![site_id], |row| {
                Ok(CrawlCandidate {
                    site_id: row.get(0)?,
                    url: row.get(1)?,
                    priority_score: row.get(2)?,
                    source_url: row.get(3)?,
                    discovered_at: timestamp_at(row, 4)?,
                    visited: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    // ===== Visits =====

    fn record_visit(&mut self, visit: &VisitResult) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO visit_results
                (site_id, url, visited_at, http_status, response_time_ms, content_type,
                 content_size, extraction_attempted, extraction_success, schedule_data_found,
                 quality_score, error_type, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(site_id, url) DO UPDATE SET
                visited_at = excluded.visited_at,
                http_status = excluded.http_status,
                response_time_ms = excluded.response_time_ms,
                content_type = excluded.content_type,
                content_size = excluded.content_size,
                extraction_attempted = excluded.extraction_attempted,
                extraction_success = excluded.extraction_success,
                schedule_data_found = excluded.schedule_data_found,
                quality_score = excluded.quality_score,
                error_type = excluded.error_type,
                error_message = excluded.error_message",
            params![
                visit.site_id,
                visit.url,
                visit.visited_at.to_rfc3339(),
                visit.http_status,
                visit.response_time_ms as i64,
                visit.content_type,
                visit.content_size as i64,
                visit.extraction_attempted,
                visit.extraction_success,
                visit.schedule_data_found,
                visit.quality_score.value(),
                visit.error_type,
                visit.error_message,
            ],
        )?;
        Ok(())
    }

    fn visits_for_site(&self, site_id: i64) -> StorageResult<Vec<VisitResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, url, visited_at, http_status, response_time_ms, content_type,
                    content_size, extraction_attempted, extraction_success, schedule_data_found,
                    quality_score, error_type, error_message
             FROM visit_results WHERE site_id = ?1 ORDER BY id",
        )?;
        let visits = stmt
            .query_map(params![site_id], |row| {
                Ok(VisitResult {
                    site_id: row.get(0)?,
                    url: row.get(1)?,
                    visited_at: timestamp_at(row, 2)?,
                    http_status: row.get(3)?,
                    response_time_ms: row.get::<_, i64>(4)?.max(0) as u64,
                    content_type: row.get(5)?,
                    content_size: row.get::<_, i64>(6)?.max(0) as u64,
                    extraction_attempted: row.get(7)?,
                    extraction_success: row.get(8)?,
                    schedule_data_found: row.get(9)?,
                    quality_score: QualityScore::from_value(row.get(10)?),
                    error_type: row.get(11)?,
                    error_message: row.get(12)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(visits)
    }

    // ===== Extraction Results =====

    fn upsert_extraction(&mut self, result: &ExtractionResult) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO extraction_results
                (site_id, schedule_type, method, confidence, schedule_text, source_url, extracted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(site_id, schedule_type) DO UPDATE SET
                method = excluded.method,
                confidence = excluded.confidence,
                schedule_text = excluded.schedule_text,
                source_url = excluded.source_url,
                extracted_at = excluded.extracted_at",
            params![
                result.site_id,
                result.schedule_type.to_db_string(),
                result.method.to_db_string(),
                result.confidence,
                result.schedule_text,
                result.source_url,
                result.extracted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_extraction(
        &self,
        site_id: i64,
        schedule_type: ScheduleType,
    ) -> StorageResult<Option<ExtractionResult>> {
        let result = self
            .conn
            .query_row(
                "SELECT site_id, schedule_type, method, confidence, schedule_text, source_url, extracted_at
                 FROM extraction_results WHERE site_id = ?1 AND schedule_type = ?2",
                params![site_id, schedule_type.to_db_string()],
                extraction_from_row,
            )
            .optional()?;
        Ok(result)
    }

    fn list_extractions(&self) -> StorageResult<Vec<ExtractionResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, schedule_type, method, confidence, schedule_text, source_url, extracted_at
             FROM extraction_results ORDER BY site_id, schedule_type",
        )?;
        let results = stmt
            .query_map([], extraction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    // ===== Blocking =====

    fn save_blocking_assessment(
        &mut self,
        site_id: i64,
        assessment: &BlockingAssessment,
    ) -> StorageResult<()> {
        let evidence = serde_json::to_string(&assessment.evidence)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO blocking_assessments
                (site_id, is_blocked, blocking_type, evidence, status_code, robots_decision, assessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(site_id) DO UPDATE SET
                is_blocked = excluded.is_blocked,
                blocking_type = excluded.blocking_type,
                evidence = excluded.evidence,
                status_code = excluded.status_code,
                robots_decision = excluded.robots_decision,
                assessed_at = excluded.assessed_at",
            params![
                site_id,
                assessment.is_blocked,
                assessment.blocking_type.map(|t| t.to_db_string()),
                evidence,
                assessment.status_code,
                assessment.robots_decision.to_db_string(),
                now,
            ],
        )?;
        Ok(())
    }

    fn get_blocking_assessment(&self, site_id: i64) -> StorageResult<Option<BlockingAssessment>> {
        let row = self
            .conn
            .query_row(
                "SELECT is_blocked, blocking_type, evidence, status_code, robots_decision
                 FROM blocking_assessments WHERE site_id = ?1",
                params![site_id],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<u16>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((is_blocked, blocking_type, evidence, status_code, robots_decision)) = row else {
            return Ok(None);
        };

        let evidence: Vec<String> = serde_json::from_str(&evidence)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(BlockingAssessment {
            is_blocked,
            blocking_type: blocking_type.as_deref().and_then(BlockingType::from_db_string),
            evidence,
            status_code,
            robots_decision: RobotsDecision::from_db_string(&robots_decision).unwrap_or_default(),
        }))
    }

    // ===== Golden URLs =====

    fn record_golden_url(&mut self, golden: &GoldenUrl) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO golden_urls (site_id, schedule_type, url, confidence, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(site_id, schedule_type, url) DO UPDATE SET
                confidence = excluded.confidence,
                recorded_at = excluded.recorded_at",
            params![
                golden.site_id,
                golden.schedule_type.to_db_string(),
                golden.url,
                golden.confidence,
                golden.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn golden_urls(&self, site_id: i64) -> StorageResult<Vec<GoldenUrl>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, schedule_type, url, confidence, recorded_at
             FROM golden_urls WHERE site_id = ?1
             ORDER BY confidence DESC, recorded_at DESC",
        )?;
        let golden = stmt
            .query_map(params![site_id], |row| {
                Ok(GoldenUrl {
                    site_id: row.get(0)?,
                    schedule_type: schedule_type_at(row, 1)?,
                    url: row.get(2)?,
                    confidence: row.get(3)?,
                    recorded_at: timestamp_at(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(golden)
    }

    // ===== Keywords =====

    fn insert_keyword(&mut self, keyword: &KeywordRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO keywords (keyword, scope, weight, negative) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(keyword, scope, negative) DO UPDATE SET weight = excluded.weight",
            params![
                keyword.keyword,
                keyword.scope.to_db_string(),
                keyword.weight,
                keyword.negative,
            ],
        )?;
        Ok(())
    }

    fn load_keywords(&self) -> StorageResult<Vec<KeywordRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT keyword, scope, weight, negative FROM keywords ORDER BY id")?;
        let keywords = stmt
            .query_map([], |row| {
                let scope: String = row.get(1)?;
                Ok(KeywordRecord {
                    keyword: row.get(0)?,
                    scope: KeywordScope::from_db_string(&scope)
                        .ok_or_else(|| conversion_error(1, format!("unknown scope: {}", scope)))?,
                    weight: row.get(2)?,
                    negative: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keywords)
    }

    // ===== Statistics =====

    fn count_sites(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sites", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_visits_by_quality(&self) -> StorageResult<HashMap<QualityScore, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT quality_score, COUNT(*) FROM visit_results GROUP BY quality_score")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = HashMap::new();
        for row in rows {
            let (value, count) = row?;
            *counts.entry(QualityScore::from_value(value)).or_insert(0) += count as u64;
        }
        Ok(counts)
    }

    fn count_blocked_sites(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM blocking_assessments WHERE is_blocked = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_extractions_by_method(&self) -> StorageResult<HashMap<ExtractionMethod, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT method, COUNT(*) FROM extraction_results GROUP BY method")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = HashMap::new();
        for row in rows {
            let (method, count) = row?;
            if let Some(method) = ExtractionMethod::from_db_string(&method) {
                counts.insert(method, count as u64);
            }
        }
        Ok(counts)
    }
}
