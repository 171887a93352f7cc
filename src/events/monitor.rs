use crate::events::{EventSink, LifecycleEvent};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct SiteActivity {
    last_event: Instant,
    finished: bool,
}

/// Flags in-progress sites that have emitted nothing for longer than a window
#[derive(Debug)]
pub struct StalenessMonitor {
    window: Duration,
    sites: Mutex<HashMap<i64, SiteActivity>>,
}

impl StalenessMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sites: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn observe(&self, event: &LifecycleEvent, now: Instant) {
        let mut sites = self.sites.lock().unwrap_or_else(|e| e.into_inner());
        sites.insert(
            event.site_id(),
            SiteActivity {
                last_event: now,
                finished: event.is_terminal(),
            },
        );
    }

    /// In-progress sites whose last event is older than the window, sorted
    pub fn stale_sites(&self, now: Instant) -> Vec<i64> {
        let sites = self.sites.lock().unwrap_or_else(|e| e.into_inner());
        let mut stale: Vec<i64> = sites
            .iter()
            .filter(|(_, a)| !a.finished && now.saturating_duration_since(a.last_event) > self.window)
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();
        stale
    }

    pub fn in_progress(&self) -> usize {
        let sites = self.sites.lock().unwrap_or_else(|e| e.into_inner());
        sites.values().filter(|a| !a.finished).count()
    }
}

impl EventSink for StalenessMonitor {
    fn emit(&self, event: LifecycleEvent) {
        self.observe(&event, Instant::now());
    }
}
