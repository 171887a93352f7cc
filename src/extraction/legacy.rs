//! Last-resort paragraph match

use crate::crawler::parser::is_stripped_element;
use crate::extraction::keyword::{finding_from_text, MAX_SNIPPET_CHARS};
use crate::extraction::patterns::{schedule_pattern, squash_whitespace};
use crate::extraction::{ScheduleFinding, ScheduleType};
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Fixed confidence of a paragraph match
pub const LEGACY_CONFIDENCE: u8 = 40;

static PARAGRAPH: OnceLock<Selector> = OnceLock::new();

fn in_stripped_region(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|el| is_stripped_element(el.value().name()))
}

/// First paragraph whose full text mentions the schedule type
///
/// Paragraphs inside navigation, footers, scripts and other stripped
/// regions are skipped.
pub fn extract_legacy(html: &str, schedule_type: ScheduleType) -> Option<ScheduleFinding> {
    let selector = PARAGRAPH
        .get_or_init(|| Selector::parse("p").expect("static 'p' CSS selector is valid"));
    let pattern = schedule_pattern(schedule_type);
    let document = Html::parse_document(html);

    document
        .select(selector)
        .filter(|p| !in_stripped_region(p))
        .map(|p| squash_whitespace(&p.text().collect::<String>()))
        .find(|text| pattern.is_match(text))
        .map(|text| {
            let text: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
            ScheduleFinding {
                confidence: LEGACY_CONFIDENCE,
                ..finding_from_text(&text, LEGACY_CONFIDENCE)
            }
        })
}
