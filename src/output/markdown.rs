//! Markdown summary generation
//!
//! This module renders the current extraction results as a human-readable
//! markdown table, one row per (site, schedule type), followed by the sites
//! whose root was blocked.

use crate::extraction::ExtractionResult;
use crate::gate::BlockingAssessment;
use crate::output::OutputResult;
use crate::storage::{RunRecord, SiteRecord, Storage};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Longest schedule text shown in a table cell
const MAX_CELL_CHARS: usize = 160;

/// Everything the summary shows
#[derive(Debug, Clone, Default)]
pub struct SummaryData {
    pub run: Option<RunRecord>,
    pub sites: Vec<SiteRecord>,
    pub results: Vec<ExtractionResult>,
    pub blocked: Vec<(i64, BlockingAssessment)>,
}

impl SummaryData {
    /// Reads the summary data from storage
    pub fn load(storage: &dyn Storage) -> OutputResult<Self> {
        let sites = storage.list_sites()?;
        let mut blocked = Vec::new();
        for site in &sites {
            if let Some(assessment) = storage.get_blocking_assessment(site.id)? {
                if assessment.is_blocked {
                    blocked.push((site.id, assessment));
                }
            }
        }

        Ok(Self {
            run: storage.get_latest_run()?,
            results: storage.list_extractions()?,
            sites,
            blocked,
        })
    }
}

/// Writes the markdown summary to `output_path`
///
/// # Arguments
///
/// * `storage` - The store to read results and blocking assessments from
/// * `output_path` - Where to write the file; an existing file is replaced
///
/// # Returns
///
/// * `Ok(usize)` - Number of result rows written
/// * `Err(OutputError)` - The store could not be read or the file written
pub fn generate_markdown_summary(storage: &dyn Storage, output_path: &Path) -> OutputResult<usize> {
    let data = SummaryData::load(storage)?;
    let markdown = format_markdown_summary(&data);
    fs::write(output_path, markdown)?;
    Ok(data.results.len())
}

/// Escapes a value for a single table cell
fn cell(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let shortened: String = if flat.chars().count() > MAX_CELL_CHARS {
        let mut s: String = flat.chars().take(MAX_CELL_CHARS).collect();
        s.push('…');
        s
    } else {
        flat
    };
    shortened.replace('|', "\\|")
}

/// Formats the summary as markdown
pub fn format_markdown_summary(data: &SummaryData) -> String {
    let names: HashMap<i64, &str> = data
        .sites
        .iter()
        .map(|s| (s.id, s.name.as_str()))
        .collect();
    let site_name = |id: i64| names.get(&id).copied().unwrap_or("(unknown site)");

    let mut md = String::new();
    md.push_str("# Schedule Scout Summary\n\n");

    if let Some(run) = &data.run {
        md.push_str("## Run Information\n\n");
        md.push_str(&format!("- **Run ID**: {}\n", run.id));
        md.push_str(&format!("- **Started**: {}\n", run.started_at.to_rfc3339()));
        if let Some(finished) = run.finished_at {
            md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
        }
        md.push_str(&format!("- **Status**: {}\n", run.status.to_db_string()));
        md.push_str(&format!("- **Config Hash**: {}\n\n", run.config_hash));
    }

    let found = data.results.iter().filter(|r| r.found()).count();
    md.push_str("## Overview\n\n");
    md.push_str(&format!("- **Sites**: {}\n", data.sites.len()));
    md.push_str(&format!("- **Results**: {}\n", data.results.len()));
    md.push_str(&format!("- **Found**: {}\n", found));
    md.push_str(&format!("- **Blocked Sites**: {}\n\n", data.blocked.len()));

    md.push_str("## Schedules\n\n");
    if data.results.is_empty() {
        md.push_str("No extraction results yet.\n\n");
    } else {
        md.push_str("| Site | Type | Method | Confidence | Schedule | Source |\n");
        md.push_str("|------|------|--------|------------|----------|--------|\n");
        for result in &data.results {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                cell(site_name(result.site_id)),
                result.schedule_type.label(),
                result.method,
                result.confidence,
                cell(&result.schedule_text),
                result.source_url.as_deref().map(cell).unwrap_or_default(),
            ));
        }
        md.push('\n');
    }

    if !data.blocked.is_empty() {
        md.push_str("## Blocked Sites\n\n");
        md.push_str("| Site | Blocking | Evidence |\n");
        md.push_str("|------|----------|----------|\n");
        for (site_id, assessment) in &data.blocked {
            let kind = assessment
                .blocking_type
                .map(|k| k.to_db_string())
                .unwrap_or("unknown");
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                cell(site_name(*site_id)),
                kind,
                cell(&assessment.evidence.join("; ")),
            ));
        }
        md.push('\n');
    }

    md
}
