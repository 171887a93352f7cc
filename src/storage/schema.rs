//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Schedule Scout database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Target sites
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    base_url TEXT NOT NULL,
    site_group TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sites_group ON sites(site_group);

-- Every URL a session discovered, one row per (site, normalized url)
CREATE TABLE IF NOT EXISTS crawl_candidates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    priority_score REAL NOT NULL,
    source_url TEXT,
    discovered_at TEXT NOT NULL,
    visited INTEGER NOT NULL DEFAULT 0,
    UNIQUE(site_id, url)
);

CREATE INDEX IF NOT EXISTS idx_candidates_site ON crawl_candidates(site_id);

-- Outcome of every fetch attempt
CREATE TABLE IF NOT EXISTS visit_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    visited_at TEXT NOT NULL,
    http_status INTEGER,
    response_time_ms INTEGER NOT NULL DEFAULT 0,
    content_type TEXT,
    content_size INTEGER NOT NULL DEFAULT 0,
    extraction_attempted INTEGER NOT NULL DEFAULT 0,
    extraction_success INTEGER NOT NULL DEFAULT 0,
    schedule_data_found INTEGER NOT NULL DEFAULT 0,
    quality_score REAL NOT NULL,
    error_type TEXT,
    error_message TEXT,
    UNIQUE(site_id, url)
);

CREATE INDEX IF NOT EXISTS idx_visits_site ON visit_results(site_id);

-- Latest answer per (site, schedule type)
CREATE TABLE IF NOT EXISTS extraction_results (
    site_id INTEGER NOT NULL,
    schedule_type TEXT NOT NULL,
    method TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    schedule_text TEXT NOT NULL,
    source_url TEXT,
    extracted_at TEXT NOT NULL,
    PRIMARY KEY (site_id, schedule_type)
);

-- Root blocking assessment, overwritten each session
CREATE TABLE IF NOT EXISTS blocking_assessments (
    site_id INTEGER PRIMARY KEY,
    is_blocked INTEGER NOT NULL,
    blocking_type TEXT,
    evidence TEXT NOT NULL,
    status_code INTEGER,
    robots_decision TEXT NOT NULL,
    assessed_at TEXT NOT NULL
);

-- High-confidence source URLs remembered across sessions
CREATE TABLE IF NOT EXISTS golden_urls (
    site_id INTEGER NOT NULL,
    schedule_type TEXT NOT NULL,
    url TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (site_id, schedule_type, url)
);

-- Keyword-weight store
CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL,
    scope TEXT NOT NULL,
    weight REAL NOT NULL,
    negative INTEGER NOT NULL DEFAULT 0,
    UNIQUE(keyword, scope, negative)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
