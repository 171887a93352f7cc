//! Per-site max-priority queue of crawl candidates

use crate::url::comparison_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Priority given to golden URLs so they are popped before anything else
pub const FORCED_PRIORITY: f64 = 1.0e6;

/// A URL discovered for a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlCandidate {
    pub site_id: i64,
    /// Normalized URL
    pub url: String,
    pub priority_score: f64,
    pub source_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub visited: bool,
}

impl CrawlCandidate {
    pub fn new(site_id: i64, url: &str, priority_score: f64, source_url: Option<String>) -> Self {
        Self {
            site_id,
            url: url.to_string(),
            priority_score,
            source_url,
            discovered_at: Utc::now(),
            visited: false,
        }
    }
}

#[derive(Debug)]
struct QueueEntry {
    score: f64,
    seq: u64,
    key: String,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Higher score first; among equal scores the earlier discovery wins
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Max-priority frontier with a visited set
///
/// A URL is handed out by [`Frontier::pop`] at most once. Pushing a known
/// URL with a higher score raises its priority; the stale heap entry is
/// skipped when it surfaces. URLs that differ only by a `www.` host prefix
/// are the same entry.
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<QueueEntry>,
    candidates: HashMap<String, CrawlCandidate>,
    visited: HashSet<String>,
    seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate; returns false if the URL was visited or already
    /// queued at an equal or higher score
    pub fn push(&mut self, candidate: CrawlCandidate) -> bool {
        let key = comparison_key(&candidate.url);
        if self.visited.contains(&key) {
            return false;
        }

        let score = candidate.priority_score;
        if let Some(existing) = self.candidates.get_mut(&key) {
            if existing.priority_score >= score {
                return false;
            }
            existing.priority_score = score;
        } else {
            self.candidates.insert(key.clone(), candidate);
        }

        self.seq += 1;
        self.heap.push(QueueEntry {
            score,
            seq: self.seq,
            key,
        });
        true
    }

    /// Pops the highest-scoring unvisited candidate and marks it visited
    pub fn pop(&mut self) -> Option<CrawlCandidate> {
        while let Some(entry) = self.heap.pop() {
            if self.visited.contains(&entry.key) {
                continue;
            }
            let Some(candidate) = self.candidates.get_mut(&entry.key) else {
                continue;
            };
            if candidate.priority_score != entry.score {
                continue;
            }

            candidate.visited = true;
            self.visited.insert(entry.key);
            return Some(candidate.clone());
        }
        None
    }

    /// Marks a URL visited without popping it (e.g. the site root)
    ///
    /// Returns false if the URL was already visited.
    pub fn mark_visited(&mut self, url: &str) -> bool {
        let key = comparison_key(url);
        if let Some(candidate) = self.candidates.get_mut(&key) {
            candidate.visited = true;
        }
        self.visited.insert(key)
    }

    /// Number of queued, unvisited candidates
    pub fn len(&self) -> usize {
        self.candidates.len() - self.candidates.values().filter(|c| c.visited).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Every candidate seen this session, visited or not
    pub fn candidates(&self) -> impl Iterator<Item = &CrawlCandidate> {
        self.candidates.values()
    }
}
