//! Output module for reports on stored crawl results
//!
//! This module handles:
//! - Aggregate statistics for `--stats`
//! - The markdown summary written by `--export-summary`

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary, SummaryData};
pub use stats::{format_statistics, load_statistics, print_statistics, ScoutStatistics};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
