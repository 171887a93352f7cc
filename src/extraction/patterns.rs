//! Text patterns shared by the local extraction stages

use crate::extraction::ScheduleType;
use regex::Regex;
use std::sync::OnceLock;

static RECONCILIATION: OnceLock<Regex> = OnceLock::new();
static ADORATION: OnceLock<Regex> = OnceLock::new();
static MASS: OnceLock<Regex> = OnceLock::new();
static TIME_OF_DAY: OnceLock<Regex> = OnceLock::new();
static DAY: OnceLock<Regex> = OnceLock::new();
static HOURS_PER: OnceLock<Regex> = OnceLock::new();
static APPOINTMENT: OnceLock<Regex> = OnceLock::new();

/// Terms that mark text as being about a schedule type
pub fn schedule_pattern(schedule_type: ScheduleType) -> &'static Regex {
    match schedule_type {
        ScheduleType::Reconciliation => RECONCILIATION.get_or_init(|| {
            Regex::new(r"(?i)\b(?:confessions?|reconciliation|penance)\b")
                .expect("static reconciliation pattern is valid")
        }),
        ScheduleType::Adoration => ADORATION.get_or_init(|| {
            Regex::new(r"(?i)\b(?:adoration|exposition|holy\s+hours?|blessed\s+sacrament)\b")
                .expect("static adoration pattern is valid")
        }),
        ScheduleType::Mass => MASS.get_or_init(|| {
            Regex::new(r"(?i)\b(?:mass(?:es)?|liturgy|eucharist)\b")
                .expect("static mass pattern is valid")
        }),
    }
}

/// Times such as `3pm`, `3:30 p.m.`, `15:00`, `noon`
pub fn time_pattern() -> &'static Regex {
    TIME_OF_DAY.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:1[0-2]|0?[1-9])(?::[0-5]\d)?\s*(?:a\.m\.|p\.m\.|am\b|pm\b)|\b(?:[01]?\d|2[0-3]):[0-5]\d\b|\b(?:noon|midnight)\b",
        )
        .expect("static time pattern is valid")
    })
}

/// Day names and recurring-day words
pub fn day_pattern() -> &'static Regex {
    DAY.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(?:mon|tues|wednes|thurs|fri|satur|sun)days?|weekdays?|daily)\b")
            .expect("static day pattern is valid")
    })
}

/// "N hours per week/month" phrases
pub fn hours_per_pattern() -> &'static Regex {
    HOURS_PER.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:\d+(?:\.\d+)?|one|two|three|four|five|six|seven|eight|nine|ten|twelve|twenty[- ]four)\s+hours?\s+(?:per|a|each|every)\s+(?:week|month)\b",
        )
        .expect("static hours-per pattern is valid")
    })
}

pub fn appointment_pattern() -> &'static Regex {
    APPOINTMENT.get_or_init(|| {
        Regex::new(r"(?i)\bby\s+appointment\b").expect("static appointment pattern is valid")
    })
}

/// Distinct matches of a pattern, in order of first appearance
pub fn distinct_matches(pattern: &Regex, text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in pattern.find_iter(text) {
        let value = m.as_str().trim().to_string();
        if !found.iter().any(|f| f.eq_ignore_ascii_case(&value)) {
            found.push(value);
        }
    }
    found
}

/// Collapses runs of whitespace to single spaces
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_patterns_use_word_boundaries() {
        let mass = schedule_pattern(ScheduleType::Mass);
        assert!(mass.is_match("Sunday Masses at 9"));
        assert!(!mass.is_match("Boston, Massachusetts"));

        let rec = schedule_pattern(ScheduleType::Reconciliation);
        assert!(rec.is_match("Confessions heard Saturday"));
        assert!(!rec.is_match("confessional booth"));
    }

    #[test]
    fn test_time_pattern() {
        let t = time_pattern();
        for ok in ["3pm", "3:30 p.m.", "10 AM", "15:00", "noon"] {
            assert!(t.is_match(ok), "{} should match", ok);
        }
        assert!(!t.is_match("Room 305"));
    }

    #[test]
    fn test_day_pattern() {
        assert_eq!(
            distinct_matches(day_pattern(), "Saturday and saturday, also Weekdays"),
            vec!["Saturday".to_string(), "Weekdays".to_string()]
        );
    }

    #[test]
    fn test_hours_per_pattern() {
        let m = hours_per_pattern().find("We offer 24 hours per week of adoration").unwrap();
        assert_eq!(m.as_str(), "24 hours per week");
        assert!(hours_per_pattern().is_match("Three hours a month"));
    }
}
