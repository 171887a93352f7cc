//! Content quality scoring
//!
//! Pages are rated on a fixed ordinal scale from the weighted count of
//! schedule-keyword occurrences in their cleaned text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// High-value terms name the schedule facts themselves (×3)
const HIGH_TIER: &[&str] = &[
    "confession",
    "reconciliation",
    "penance",
    "adoration",
    "exposition",
    "holy hour",
    "mass times",
    "mass schedule",
];

/// Medium-value terms usually surround a schedule (×2)
const MEDIUM_TIER: &[&str] = &[
    "schedule",
    "saturday",
    "sunday",
    "weekday",
    "daily",
    "by appointment",
    "blessed sacrament",
    "vigil",
];

/// Low-value terms only show the page is about parish life (×1)
const LOW_TIER: &[&str] = &[
    "parish",
    "church",
    "chapel",
    "liturgy",
    "sacrament",
    "worship",
    "hours",
];

const GOOD_MIN: u32 = 15;
const FAIR_MIN: u32 = 8;
const POOR_MIN: u32 = 3;

/// Ordinal page-quality scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityScore {
    Error,
    Irrelevant,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityScore {
    pub const ALL: [QualityScore; 6] = [
        Self::Excellent,
        Self::Good,
        Self::Fair,
        Self::Poor,
        Self::Irrelevant,
        Self::Error,
    ];

    pub fn value(&self) -> f64 {
        match self {
            Self::Excellent => 1.0,
            Self::Good => 0.8,
            Self::Fair => 0.6,
            Self::Poor => 0.4,
            Self::Irrelevant => 0.2,
            Self::Error => 0.0,
        }
    }

    /// Maps a stored value back to the nearest level
    pub fn from_value(value: f64) -> Self {
        Self::ALL
            .into_iter()
            .min_by(|a, b| {
                (a.value() - value)
                    .abs()
                    .total_cmp(&(b.value() - value).abs())
            })
            .unwrap_or(Self::Error)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Fair => "FAIR",
            Self::Poor => "POOR",
            Self::Irrelevant => "IRRELEVANT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn occurrences(haystack: &str, needle: &str) -> u32 {
    haystack.matches(needle).count() as u32
}

/// Weighted keyword-tier hits in already-lowercased text
pub fn weighted_keyword_score(text_lower: &str) -> u32 {
    let tier = |terms: &[&str], weight: u32| -> u32 {
        terms
            .iter()
            .map(|t| occurrences(text_lower, t) * weight)
            .sum()
    };
    tier(HIGH_TIER, 3) + tier(MEDIUM_TIER, 2) + tier(LOW_TIER, 1)
}

/// Rates a fetched page
///
/// # Arguments
///
/// * `text` - Visible page text, or `None` when nothing could be read
/// * `schedule_data_found` - Whether the keyword pass found schedule text
///
/// # Returns
///
/// `Excellent` for pages with schedule data, `Error` for unreadable
/// responses, otherwise a tier from the weighted keyword score
pub fn score_content(text: Option<&str>, schedule_data_found: bool) -> QualityScore {
    let Some(text) = text else {
        return QualityScore::Error;
    };
    if schedule_data_found {
        return QualityScore::Excellent;
    }

    let score = weighted_keyword_score(&text.to_lowercase());
    match score {
        s if s >= GOOD_MIN => QualityScore::Good,
        s if s >= FAIR_MIN => QualityScore::Fair,
        s if s >= POOR_MIN => QualityScore::Poor,
        _ => QualityScore::Irrelevant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_schedule_is_excellent() {
        assert_eq!(score_content(Some("anything"), true), QualityScore::Excellent);
    }

    #[test]
    fn test_no_content_is_error() {
        assert_eq!(score_content(None, true), QualityScore::Error);
    }

    #[test]
    fn test_tiers_are_weighted() {
        assert_eq!(weighted_keyword_score("confession"), 3);
        assert_eq!(weighted_keyword_score("saturday"), 2);
        assert_eq!(weighted_keyword_score("chapel"), 1);
        assert_eq!(weighted_keyword_score("confession confession"), 6);
    }

    #[test]
    fn test_descending_levels() {
        assert_eq!(score_content(Some("Bake sale on the lawn"), false), QualityScore::Irrelevant);
        assert_eq!(score_content(Some("Confession"), false), QualityScore::Poor);
        assert_eq!(
            score_content(Some("Confession and Adoration schedule"), false),
            QualityScore::Fair
        );
        assert_eq!(
            score_content(
                Some("Confession Saturday. Adoration Sunday. Penance and exposition schedule."),
                false
            ),
            QualityScore::Good
        );
    }

    #[test]
    fn test_value_roundtrip() {
        for q in QualityScore::ALL {
            assert_eq!(QualityScore::from_value(q.value()), q);
        }
        assert_eq!(QualityScore::from_value(0.79), QualityScore::Good);
    }

    #[test]
    fn test_ordering_matches_values() {
        assert!(QualityScore::Excellent > QualityScore::Good);
        assert!(QualityScore::Irrelevant > QualityScore::Error);
    }
}
