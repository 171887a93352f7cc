//! URL priority scoring
//!
//! `priority(url)` is the sum of the weights of positive keywords found in
//! the URL path, minus a penalty per negative keyword, plus a depth bonus
//! for deep paths and a bonus for URLs on the site's own domain.

use crate::config::ScoringConfig;
use crate::extraction::ScheduleType;
use crate::frontier::KeywordSet;
use crate::url::path_depth;
use std::sync::Arc;
use url::Url;

fn bare_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| {
        let h = h.to_lowercase();
        h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
    })
}

/// Whether `keyword` occurs in a lowercased path, with its spaces written
/// as `-`, `_` or nothing
pub(super) fn path_mentions(path: &str, keyword: &str) -> bool {
    if !keyword.contains(' ') {
        return path.contains(keyword);
    }
    ["-", "_", "", "%20"]
        .iter()
        .any(|sep| path.contains(&keyword.replace(' ', sep)))
}

/// Scores URLs for one site
#[derive(Debug, Clone)]
pub struct Prioritizer {
    keywords: Arc<KeywordSet>,
    scoring: ScoringConfig,
    site_host: Option<String>,
    schedule_types: Vec<ScheduleType>,
}

impl Prioritizer {
    pub fn new(
        keywords: Arc<KeywordSet>,
        scoring: ScoringConfig,
        site_url: &Url,
        schedule_types: &[ScheduleType],
    ) -> Self {
        Self {
            keywords,
            scoring,
            site_host: bare_host(site_url),
            schedule_types: schedule_types.to_vec(),
        }
    }

    /// Keyword part of the score only: positive weights minus negative penalties
    pub fn keyword_score(&self, url: &Url, schedule_type: ScheduleType) -> f64 {
        let path = url.path().to_lowercase();

        let positive: f64 = self
            .keywords
            .positive(schedule_type)
            .iter()
            .filter(|k| path_mentions(&path, &k.keyword))
            .map(|k| k.weight)
            .sum();

        let negative_hits = self
            .keywords
            .negative(schedule_type)
            .iter()
            .filter(|k| path_mentions(&path, k))
            .count();

        positive - negative_hits as f64 * self.scoring.negative_penalty
    }

    /// Full score of a URL for one schedule type
    pub fn score_for(&self, url: &Url, schedule_type: ScheduleType) -> f64 {
        let mut score = self.keyword_score(url, schedule_type);

        if path_depth(url) > self.scoring.depth_threshold {
            score += self.scoring.depth_bonus;
        }

        if self.site_host.is_some() && bare_host(url) == self.site_host {
            score += self.scoring.same_domain_bonus;
        }

        score
    }

    /// Frontier priority: the best score across the schedule types of interest
    pub fn priority(&self, url: &Url) -> f64 {
        self.schedule_types
            .iter()
            .map(|t| self.score_for(url, *t))
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
            .unwrap_or(0.0)
    }

    /// Candidates ordered best first; ties keep their input order
    pub fn rank(&self, candidates: &[Url], schedule_type: ScheduleType) -> Vec<(Url, f64)> {
        let mut ranked: Vec<(Url, f64)> = candidates
            .iter()
            .map(|u| (u.clone(), self.score_for(u, schedule_type)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// The page extraction should be attempted on first
    pub fn choose_best_url(&self, candidates: &[Url], schedule_type: ScheduleType) -> Option<Url> {
        self.rank(candidates, schedule_type)
            .into_iter()
            .next()
            .map(|(url, _)| url)
    }
}
