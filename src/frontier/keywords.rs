//! Keyword-weight sources
//!
//! Weights come from the `keywords` table, an optional TOML keyword file, or
//! a built-in fallback table, and are bucketed per schedule type.

use crate::config::KeywordConfig;
use crate::extraction::ScheduleType;
use crate::storage::{lock_storage, SharedStorage, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors loading keyword weights
#[derive(Debug, Error)]
pub enum KeywordError {
    #[error("Failed to read keyword file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse keyword file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Keyword store error: {0}")]
    Store(#[from] StorageError),

    #[error("No keyword source is available and the fallback table is disabled")]
    Unavailable,
}

/// Which schedule buckets a stored keyword applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordScope {
    Reconciliation,
    Adoration,
    Mass,
    /// Reconciliation and adoration
    Both,
    All,
}

impl KeywordScope {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Reconciliation => "reconciliation",
            Self::Adoration => "adoration",
            Self::Mass => "mass",
            Self::Both => "both",
            Self::All => "all",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "reconciliation" => Some(Self::Reconciliation),
            "adoration" => Some(Self::Adoration),
            "mass" => Some(Self::Mass),
            "both" => Some(Self::Both),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// The schedule-type buckets this scope fans out into
    pub fn schedule_types(&self) -> &'static [ScheduleType] {
        match self {
            Self::Reconciliation => &[ScheduleType::Reconciliation],
            Self::Adoration => &[ScheduleType::Adoration],
            Self::Mass => &[ScheduleType::Mass],
            Self::Both => &[ScheduleType::Reconciliation, ScheduleType::Adoration],
            Self::All => ScheduleType::all(),
        }
    }
}

/// One keyword-weight mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub keyword: String,
    pub scope: KeywordScope,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub negative: bool,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct KeywordFile {
    #[serde(default, rename = "keyword")]
    keywords: Vec<KeywordRecord>,
}

/// A positive keyword and its weight
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedKeyword {
    pub keyword: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default)]
struct Bucket {
    positive: Vec<WeightedKeyword>,
    negative: Vec<String>,
}

/// Keyword weights bucketed by schedule type
#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    buckets: HashMap<ScheduleType, Bucket>,
}

const FALLBACK: &[(&str, KeywordScope, f64, bool)] = &[
    ("confession", KeywordScope::Reconciliation, 10.0, false),
    ("reconciliation", KeywordScope::Reconciliation, 10.0, false),
    ("penance", KeywordScope::Reconciliation, 8.0, false),
    ("sacraments", KeywordScope::Reconciliation, 3.0, false),
    ("adoration", KeywordScope::Adoration, 10.0, false),
    ("eucharistic", KeywordScope::Adoration, 8.0, false),
    ("exposition", KeywordScope::Adoration, 6.0, false),
    ("holy hour", KeywordScope::Adoration, 6.0, false),
    ("perpetual", KeywordScope::Adoration, 4.0, false),
    ("mass times", KeywordScope::Mass, 10.0, false),
    ("mass schedule", KeywordScope::Mass, 10.0, false),
    ("mass", KeywordScope::Mass, 6.0, false),
    ("liturgy", KeywordScope::Mass, 4.0, false),
    ("worship", KeywordScope::Mass, 3.0, false),
    ("schedule", KeywordScope::Both, 5.0, false),
    ("hours", KeywordScope::Both, 3.0, false),
    ("times", KeywordScope::All, 3.0, false),
    ("bulletin", KeywordScope::All, 2.0, false),
    ("blog", KeywordScope::All, 1.0, true),
    ("news", KeywordScope::All, 1.0, true),
    ("donate", KeywordScope::All, 1.0, true),
    ("giving", KeywordScope::All, 1.0, true),
    ("staff", KeywordScope::All, 1.0, true),
    ("school", KeywordScope::All, 1.0, true),
    ("wedding", KeywordScope::All, 1.0, true),
    ("funeral", KeywordScope::All, 1.0, true),
];

impl KeywordSet {
    /// Buckets records, fanning `both` and `all` out into their types
    pub fn from_records(records: &[KeywordRecord]) -> Self {
        let mut set = Self::default();
        for record in records {
            let keyword = record.keyword.trim().to_lowercase();
            if keyword.is_empty() {
                continue;
            }
            for schedule_type in record.scope.schedule_types() {
                let bucket = set.buckets.entry(*schedule_type).or_default();
                if record.negative {
                    if !bucket.negative.contains(&keyword) {
                        bucket.negative.push(keyword.clone());
                    }
                } else {
                    bucket.positive.push(WeightedKeyword {
                        keyword: keyword.clone(),
                        weight: record.weight,
                    });
                }
            }
        }
        set
    }

    /// The built-in table used when no store is reachable
    pub fn fallback() -> Self {
        Self::from_records(&fallback_records())
    }

    pub fn positive(&self, schedule_type: ScheduleType) -> &[WeightedKeyword] {
        self.buckets
            .get(&schedule_type)
            .map(|b| b.positive.as_slice())
            .unwrap_or(&[])
    }

    pub fn negative(&self, schedule_type: ScheduleType) -> &[String] {
        self.buckets
            .get(&schedule_type)
            .map(|b| b.negative.as_slice())
            .unwrap_or(&[])
    }

    /// Distinct positive keywords across the given types
    pub fn tokens(&self, schedule_types: &[ScheduleType]) -> Vec<String> {
        let mut tokens: Vec<String> = schedule_types
            .iter()
            .flat_map(|t| self.positive(*t).iter().map(|k| k.keyword.clone()))
            .collect();
        tokens.sort();
        tokens.dedup();
        tokens
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|b| b.positive.is_empty())
    }
}

pub fn fallback_records() -> Vec<KeywordRecord> {
    FALLBACK
        .iter()
        .map(|(keyword, scope, weight, negative)| KeywordRecord {
            keyword: keyword.to_string(),
            scope: *scope,
            weight: *weight,
            negative: *negative,
        })
        .collect()
}

/// Reads a TOML keyword file of `[[keyword]]` tables
pub fn load_keyword_file(path: &Path) -> Result<Vec<KeywordRecord>, KeywordError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| KeywordError::Io {
        path: display.clone(),
        source,
    })?;
    let file: KeywordFile = toml::from_str(&content).map_err(|source| KeywordError::Parse {
        path: display,
        source,
    })?;
    Ok(file.keywords)
}

/// Resolves the keyword set from the configured sources
///
/// A configured file that cannot be read is an error. An unreachable
/// database store is not: the next source is tried instead.
pub fn load_keywords(
    config: &KeywordConfig,
    storage: Option<&SharedStorage>,
) -> Result<KeywordSet, KeywordError> {
    let mut records = Vec::new();

    if let Some(file) = &config.file {
        let from_file = load_keyword_file(Path::new(file))?;
        tracing::info!(path = %file, count = from_file.len(), "Loaded keyword file");
        records.extend(from_file);
    }

    if config.use_database {
        match storage.map(|s| lock_storage(s).and_then(|s| s.load_keywords())) {
            Some(Ok(stored)) => {
                tracing::info!(count = stored.len(), "Loaded keywords from store");
                records.extend(stored);
            }
            Some(Err(e)) => tracing::warn!(error = %e, "Keyword store unavailable"),
            None => tracing::warn!("Keyword store requested but no database is open"),
        }
    }

    let set = KeywordSet::from_records(&records);
    if !set.is_empty() {
        return Ok(set);
    }

    if config.allow_fallback {
        tracing::info!("Using built-in keyword table");
        Ok(KeywordSet::fallback())
    } else {
        Err(KeywordError::Unavailable)
    }
}
