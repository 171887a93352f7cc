//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Site registry and run tracking
//! - Crawl candidates and visit outcomes
//! - Extraction results, blocking assessments and golden URLs
//! - The keyword-weight store

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::SiteEntry;
use crate::ScoutError;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// A storage backend shared between concurrent site workers
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ScoutError> {
    SqliteStorage::new(path)
}

/// Wraps a backend for sharing across workers
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks a shared backend, mapping poisoning to a storage error
///
/// # Arguments
///
/// * `storage` - The shared backend
///
/// # Returns
///
/// * `Ok(MutexGuard)` - Exclusive access until the guard drops
/// * `Err(StorageError::LockPoisoned)` - A worker panicked while holding the lock
pub fn lock_storage(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// A target site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub group: Option<String>,
}

impl From<&SiteEntry> for SiteRecord {
    fn from(entry: &SiteEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
            base_url: entry.url.clone(),
            group: entry.group.clone(),
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
