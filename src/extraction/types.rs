use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted text of a result where nothing was found
pub const NOT_FOUND_TEXT: &str = "Information not found";

/// Recurring schedule fact being looked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Reconciliation,
    Adoration,
    Mass,
}

impl ScheduleType {
    pub fn all() -> &'static [ScheduleType] {
        &[Self::Reconciliation, Self::Adoration, Self::Mass]
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Reconciliation => "reconciliation",
            Self::Adoration => "adoration",
            Self::Mass => "mass",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "reconciliation" => Some(Self::Reconciliation),
            "adoration" => Some(Self::Adoration),
            "mass" => Some(Self::Mass),
            _ => None,
        }
    }

    /// Human-readable label used in prompts and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reconciliation => "Confession / Reconciliation",
            Self::Adoration => "Eucharistic Adoration",
            Self::Mass => "Mass Times",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Which stage of the chain produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Ai,
    Keyword,
    Legacy,
    None,
}

impl ExtractionMethod {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Keyword => "keyword",
            Self::Legacy => "legacy",
            Self::None => "none",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ai" => Some(Self::Ai),
            "keyword" => Some(Self::Keyword),
            "legacy" => Some(Self::Legacy),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Final answer for one (site, schedule type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub site_id: i64,
    pub schedule_type: ScheduleType,
    pub method: ExtractionMethod,
    /// 0-100
    pub confidence: u8,
    pub schedule_text: String,
    pub source_url: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn found(&self) -> bool {
        self.method != ExtractionMethod::None
    }

    /// The record persisted when no stage found anything
    pub fn not_found(site_id: i64, schedule_type: ScheduleType, source_url: Option<String>) -> Self {
        Self {
            site_id,
            schedule_type,
            method: ExtractionMethod::None,
            confidence: 0,
            schedule_text: NOT_FOUND_TEXT.to_string(),
            source_url,
            extracted_at: Utc::now(),
        }
    }

    /// Result for a finding produced by `method` on the page at `source_url`
    pub fn from_finding(
        site_id: i64,
        schedule_type: ScheduleType,
        method: ExtractionMethod,
        finding: ScheduleFinding,
        source_url: Option<String>,
    ) -> Self {
        Self {
            site_id,
            schedule_type,
            method,
            confidence: finding.confidence.min(100),
            schedule_text: finding.schedule_text,
            source_url,
            extracted_at: Utc::now(),
        }
    }
}

/// Structured schedule details reported by an extraction stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleFinding {
    pub schedule_text: String,
    /// 0-100
    pub confidence: u8,
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default)]
    pub frequency: Option<String>,
}

/// Why a stage produced nothing usable
#[derive(Debug, Clone, PartialEq)]
pub enum NotFoundReason {
    /// The stage ran and the page has no matching schedule
    NoMatch,
    /// AI answered with a confidence below the page's adaptive threshold
    BelowThreshold { confidence: u8, threshold: f64 },
    /// The stage was skipped (breaker open, disabled, or error history)
    Skipped(String),
    /// The stage failed (backend error, malformed response)
    Failed(String),
}

/// Outcome of a single stage of the chain
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Found {
        method: ExtractionMethod,
        finding: ScheduleFinding,
    },
    NotFound(NotFoundReason),
}

impl ExtractionOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_result() {
        let r = ExtractionResult::not_found(7, ScheduleType::Adoration, None);
        assert!(!r.found());
        assert_eq!(r.method, ExtractionMethod::None);
        assert_eq!(r.confidence, 0);
        assert_eq!(r.schedule_text, "Information not found");
    }

    #[test]
    fn test_schedule_type_serde_names() {
        let parsed: Vec<ScheduleType> =
            serde_json::from_str(r#"["reconciliation","adoration","mass"]"#).unwrap();
        assert_eq!(parsed, ScheduleType::all());
        for t in ScheduleType::all() {
            assert_eq!(ScheduleType::from_db_string(t.to_db_string()), Some(*t));
        }
    }

    #[test]
    fn test_method_db_strings() {
        for m in [
            ExtractionMethod::Ai,
            ExtractionMethod::Keyword,
            ExtractionMethod::Legacy,
            ExtractionMethod::None,
        ] {
            assert_eq!(ExtractionMethod::from_db_string(m.to_db_string()), Some(m));
        }
    }
}
