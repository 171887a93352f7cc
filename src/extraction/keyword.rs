//! Keyword-context extraction
//!
//! Finds text nodes that mention a schedule type, widens each hit to its
//! enclosing block plus the blocks that follow it (up to the next heading),
//! and keeps the snippet that looks most like a schedule.

use crate::crawler::parser::{collect_text, is_block_element, is_stripped_element};
use crate::extraction::patterns::{
    appointment_pattern, day_pattern, distinct_matches, hours_per_pattern, schedule_pattern,
    squash_whitespace, time_pattern,
};
use crate::extraction::{ScheduleFinding, ScheduleType};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::collections::HashSet;

/// Following sibling blocks folded into a snippet
const CONTEXT_SIBLINGS: usize = 5;

/// Longest schedule text kept
pub const MAX_SNIPPET_CHARS: usize = 1000;

const BASE_CONFIDENCE: u8 = 50;
const TIME_BONUS: u8 = 15;
const DAY_BONUS: u8 = 10;

/// Best keyword-context finding for one schedule type
pub fn extract_keyword(html: &str, schedule_type: ScheduleType) -> Option<ScheduleFinding> {
    let document = Html::parse_document(html);
    best_snippet(&document, schedule_type).map(|text| finding_from_text(&text, BASE_CONFIDENCE))
}

/// Runs keyword extraction for several types over one parse of the page
pub fn keyword_pass(html: &str, types: &[ScheduleType]) -> Vec<(ScheduleType, ScheduleFinding)> {
    let document = Html::parse_document(html);
    types
        .iter()
        .filter_map(|t| {
            best_snippet(&document, *t).map(|text| (*t, finding_from_text(&text, BASE_CONFIDENCE)))
        })
        .collect()
}

fn best_snippet(document: &Html, schedule_type: ScheduleType) -> Option<String> {
    let pattern = schedule_pattern(schedule_type);
    let mut seen = HashSet::new();
    let mut best: Option<(usize, String)> = None;

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        if !pattern.is_match(text) {
            continue;
        }

        if node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| is_stripped_element(el.value().name()))
        {
            continue;
        }
        let Some(block) = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| is_block_element(el.value().name()))
        else {
            continue;
        };
        if !seen.insert((*block).id()) {
            continue;
        }

        let text = snippet_text(block);
        if text.is_empty() {
            continue;
        }
        let score = snippet_score(&text);
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, text));
        }
    }

    best.map(|(_, text)| text)
}

/// Text of a block and of the sibling blocks after it, stopping at a heading
fn snippet_text(block: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(block, &mut raw);
    raw.push(' ');

    let mut taken = 0;
    for sibling in block.next_siblings().filter_map(ElementRef::wrap) {
        if taken == CONTEXT_SIBLINGS || is_heading(sibling.value().name()) {
            break;
        }
        if is_stripped_element(sibling.value().name()) {
            continue;
        }
        collect_text(sibling, &mut raw);
        raw.push(' ');
        taken += 1;
    }

    truncate_chars(&squash_whitespace(&raw), MAX_SNIPPET_CHARS)
}

fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn snippet_score(text: &str) -> usize {
    let mut score = text.chars().count().min(600) / 20;
    if time_pattern().is_match(text) {
        score += 30;
    }
    if appointment_pattern().is_match(text) {
        score += 20;
    }
    score
}

/// Structured finding for a snippet; `base` is the stage's floor confidence
pub(crate) fn finding_from_text(text: &str, base: u8) -> ScheduleFinding {
    let times = distinct_matches(time_pattern(), text);
    let days = distinct_matches(day_pattern(), text);
    let by_appointment = appointment_pattern().is_match(text);

    let mut confidence = base;
    if !times.is_empty() || by_appointment {
        confidence += TIME_BONUS;
    }
    if !days.is_empty() {
        confidence += DAY_BONUS;
    }

    let frequency = hours_per_pattern().find(text).map(|m| m.as_str().to_string());
    let schedule_text = match &frequency {
        Some(phrase) => phrase.clone(),
        None => text.to_string(),
    };

    ScheduleFinding {
        schedule_text,
        confidence,
        days,
        times,
        frequency,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
