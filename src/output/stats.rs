//! Statistics generation from the scout database
//!
//! This module provides functionality for extracting and displaying
//! aggregate crawl statistics from the storage layer.

use crate::extraction::ExtractionMethod;
use crate::storage::{RunRecord, Storage, StorageResult};
use crate::tracker::QualityScore;
use std::collections::HashMap;
use std::fmt::Write;

/// Aggregate counts across every stored session
#[derive(Debug, Clone, Default)]
pub struct ScoutStatistics {
    /// Number of registered sites
    pub sites: u64,

    /// Visit count per quality level
    pub visits_by_quality: HashMap<QualityScore, u64>,

    /// Sites whose root was blocked in their latest session
    pub blocked_sites: u64,

    /// Extraction results per method (`none` means not found)
    pub results_by_method: HashMap<ExtractionMethod, u64>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl ScoutStatistics {
    pub fn total_visits(&self) -> u64 {
        self.visits_by_quality.values().sum()
    }

    pub fn total_results(&self) -> u64 {
        self.results_by_method.values().sum()
    }

    /// Share of results where something was found, in percent
    pub fn found_rate(&self) -> f64 {
        let total = self.total_results();
        if total == 0 {
            return 0.0;
        }
        let not_found = self
            .results_by_method
            .get(&ExtractionMethod::None)
            .copied()
            .unwrap_or(0);
        (total - not_found) as f64 / total as f64 * 100.0
    }
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<ScoutStatistics> {
    Ok(ScoutStatistics {
        sites: storage.count_sites()?,
        visits_by_quality: storage.count_visits_by_quality()?,
        blocked_sites: storage.count_blocked_sites()?,
        results_by_method: storage.count_extractions_by_method()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Renders statistics as plain text
pub fn format_statistics(stats: &ScoutStatistics) -> String {
    let mut out = String::new();
    let total_visits = stats.total_visits();

    let _ = writeln!(out, "=== Schedule Scout Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        let _ = writeln!(out, "Latest run:");
        let _ = writeln!(out, "  Run {} ({})", run.id, run.status.to_db_string());
        let _ = writeln!(out, "  Started: {}", run.started_at.to_rfc3339());
        if let Some(finished) = run.finished_at {
            let _ = writeln!(out, "  Finished: {}", finished.to_rfc3339());
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Sites: {}", stats.sites);
    let _ = writeln!(out, "  Blocked sites: {}", stats.blocked_sites);
    let _ = writeln!(out, "  Visits recorded: {}", total_visits);
    let _ = writeln!(out);

    let _ = writeln!(out, "Visits by Quality:");
    for quality in QualityScore::ALL {
        let count = stats.visits_by_quality.get(&quality).copied().unwrap_or(0);
        let percentage = if total_visits > 0 {
            count as f64 / total_visits as f64 * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "  {}: {} ({:.1}%)", quality, count, percentage);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Results by Method:");
    for method in [
        ExtractionMethod::Ai,
        ExtractionMethod::Keyword,
        ExtractionMethod::Legacy,
        ExtractionMethod::None,
    ] {
        let count = stats.results_by_method.get(&method).copied().unwrap_or(0);
        let _ = writeln!(out, "  {}: {}", method, count);
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Found Rate: {:.1}% ({} results)",
        stats.found_rate(),
        stats.total_results()
    );
    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &ScoutStatistics) {
    print!("{}", format_statistics(stats));
}
