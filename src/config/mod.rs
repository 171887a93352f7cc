//! Configuration module for Schedule Scout
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use schedule_scout::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scout.toml")).unwrap();
//! println!("Page budget per site: {}", config.crawler.max_pages_per_site);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AiConfig, BreakerOverride, BreakerScope, BrowserConfig, Config, CrawlerConfig,
    ExtractionConfig, KeywordConfig, OutputConfig, PolitenessConfig, ScoringConfig, SiteEntry,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
