//! Robots.txt caching implementation
//!
//! Entries are keyed by origin and expire after a configurable number of
//! hours. The cache is shared by every worker and is read far more often
//! than it is written, so it sits behind an `RwLock`.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `content` - The parsed robots.txt content
    ///
    /// # Returns
    ///
    /// A new CachedRobots instance with the current timestamp
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than `ttl_hours`
    ///
    /// # Returns
    ///
    /// * `true` - If the entry has outlived the TTL
    /// * `false` - If the entry is still fresh
    pub fn is_stale(&self, ttl_hours: i64) -> bool {
        self.age() > Duration::hours(ttl_hours)
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Process-wide robots.txt cache keyed by origin
#[derive(Debug)]
pub struct RobotsCache {
    entries: RwLock<HashMap<String, CachedRobots>>,
    ttl_hours: i64,
}

impl RobotsCache {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_hours,
        }
    }

    /// Returns a fresh entry for `origin`, if any
    ///
    /// # Arguments
    ///
    /// * `origin` - The `scheme://host[:port]` key
    ///
    /// # Returns
    ///
    /// * `Some(ParsedRobots)` - If a fresh entry exists
    /// * `None` - If the origin was never fetched or its entry is stale
    pub fn get(&self, origin: &str) -> Option<ParsedRobots> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(origin)
            .filter(|cached| !cached.is_stale(self.ttl_hours))
            .map(|cached| cached.content.clone())
    }

    /// Stores parsed robots.txt for `origin`, replacing any previous entry
    pub fn insert(&self, origin: &str, robots: ParsedRobots) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(origin.to_string(), CachedRobots::new(robots));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
