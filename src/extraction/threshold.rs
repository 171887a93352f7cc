//! Adaptive acceptance threshold for AI answers
//!
//! Rich pages (many schedule keywords, long text) lower the bar; sparse
//! pages raise it.

use crate::config::ExtractionConfig;

/// Keyword hits per thousand words of `text`
pub fn keyword_density(text: &str, terms: &[&str]) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let hits: usize = terms.iter().map(|t| lower.matches(t).count()).sum();
    hits as f64 * 1000.0 / words as f64
}

/// Minimum AI confidence accepted for a page
pub fn adaptive_threshold(text: &str, density: f64, config: &ExtractionConfig) -> f64 {
    let mut threshold = config.threshold_base;

    threshold -= (density * config.density_weight / 10.0).min(config.max_density_discount);

    let chars = text.chars().count();
    if chars >= config.long_content_chars {
        threshold -= config.long_content_discount;
    } else if chars < config.short_content_chars {
        threshold += config.short_content_penalty;
    }

    threshold.clamp(config.threshold_min, config.threshold_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density() {
        let text = "confession saturday confession sunday";
        assert_eq!(keyword_density(text, &["confession"]), 500.0);
        assert_eq!(keyword_density("", &["confession"]), 0.0);
    }

    #[test]
    fn test_sparse_short_page_demands_more() {
        let config = ExtractionConfig::default();
        let threshold = adaptive_threshold("Welcome", 0.0, &config);
        assert_eq!(threshold, 80.0);
    }

    #[test]
    fn test_rich_long_page_lowers_bar() {
        let config = ExtractionConfig::default();
        let long = "word ".repeat(500);
        let threshold = adaptive_threshold(&long, 50.0, &config);
        assert_eq!(threshold, 50.0);
    }

    #[test]
    fn test_threshold_is_clamped() {
        let config = ExtractionConfig::default();
        let long = "word ".repeat(500);
        assert_eq!(adaptive_threshold(&long, 10_000.0, &config), 40.0);

        let strict = ExtractionConfig {
            threshold_base: 95.0,
            ..ExtractionConfig::default()
        };
        assert_eq!(adaptive_threshold("short", 0.0, &strict), 90.0);
    }

    #[test]
    fn test_monotonic_in_density() {
        let config = ExtractionConfig::default();
        let text = "word ".repeat(100);
        let low = adaptive_threshold(&text, 5.0, &config);
        let high = adaptive_threshold(&text, 40.0, &config);
        assert!(high <= low);
    }
}
