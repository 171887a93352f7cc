//! Schedule Scout: a respectful schedule-discovery crawler
//!
//! This crate crawls small-organization websites under a hard per-site page
//! budget, looking for recurring schedule facts (confession, adoration, mass
//! times). It respects robots.txt and rate limits, guards every class of
//! outbound operation with a circuit breaker, and extracts facts through a
//! confidence-gated AI → keyword → legacy chain.

pub mod breaker;
pub mod config;
pub mod crawler;
pub mod events;
pub mod extraction;
pub mod frontier;
pub mod gate;
pub mod output;
pub mod robots;
pub mod storage;
pub mod tracker;
pub mod url;

use thiserror::Error;

/// Main error type for Schedule Scout operations
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are the only errors that are fatal to a whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Keyword store unavailable: {0}")]
    Keywords(#[from] frontier::KeywordError),

    #[error("Persistent store unavailable: {0}")]
    Store(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Schedule Scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use extraction::{ExtractionMethod, ExtractionResult, ScheduleType};
pub use url::{normalize_base_url, normalize_url, registrable_domain};
