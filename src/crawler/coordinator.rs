//! Crawler coordinator - run-level orchestration
//!
//! This module drives a whole run:
//! - Preparing the store, the site registry and the keyword set
//! - Selecting which sites to crawl
//! - Running up to `max-concurrent-sites` sessions at once
//! - Cancelling every session on Ctrl-C
//! - Recording the run's final status

use crate::config::Config;
use crate::crawler::context::CrawlerContext;
use crate::crawler::session::{run_session, SessionReport};
use crate::events::{EventSink, LifecycleEvent};
use crate::frontier::load_keywords;
use crate::storage::{lock_storage, open_storage, share, RunStatus, SharedStorage, SiteRecord};
use crate::{ConfigError, ScoutError};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Which registered sites a run processes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteSelection {
    /// Process at most this many sites
    pub limit: Option<usize>,
    /// Process only this site
    pub site_id: Option<i64>,
    /// Process only sites in this group
    pub group: Option<String>,
}

impl SiteSelection {
    /// Filters sites (ordered by ID) down to the selection
    pub fn apply(&self, sites: Vec<SiteRecord>) -> Vec<SiteRecord> {
        sites
            .into_iter()
            .filter(|s| self.site_id.map_or(true, |id| s.id == id))
            .filter(|s| match &self.group {
                Some(group) => s.group.as_deref() == Some(group.as_str()),
                None => true,
            })
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub sites: usize,
    pub completed: usize,
    pub blocked: usize,
    pub failed: usize,
    pub pages_visited: u64,
    pub facts_found: usize,
    pub unsaved: usize,
    pub cancelled: bool,
}

impl CrawlSummary {
    fn add(&mut self, report: &SessionReport) {
        self.pages_visited += u64::from(report.pages_visited);
        self.facts_found += report.facts_found();
        self.unsaved += report.unsaved;
        if report.blocked.is_some() {
            self.blocked += 1;
        } else {
            self.completed += 1;
        }
    }
}

/// Runs site sessions on a bounded worker pool
pub struct Coordinator {
    ctx: Arc<CrawlerContext>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(ctx: Arc<CrawlerContext>) -> Self {
        Self {
            ctx,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops every session at its next loop boundary
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Crawls the given sites, at most `max-concurrent-sites` at a time
    pub async fn run(&self, sites: Vec<SiteRecord>) -> CrawlSummary {
        let workers = self.ctx.config.crawler.max_concurrent_sites.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut summary = CrawlSummary {
            sites: sites.len(),
            ..Default::default()
        };
        let start_time = std::time::Instant::now();

        tracing::info!("Crawling {} sites with {} workers", sites.len(), workers);

        for site in sites {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let ctx = Arc::clone(&self.ctx);
            let cancel = self.cancel.child_token();
            tasks.spawn(async move {
                let _permit = permit;
                let site_id = site.id;
                let result = run_session(&ctx, site, cancel).await;
                if let Err(e) = &result {
                    ctx.events.emit(LifecycleEvent::SiteError {
                        site_id,
                        message: e.to_string(),
                        at: Utc::now(),
                    });
                }
                (site_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.cancelled |= report.cancelled;
                    summary.add(&report);
                }
                Ok((site_id, Err(e))) => {
                    tracing::error!(site_id, error = %e, "Site session failed");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Site worker panicked");
                    summary.failed += 1;
                }
            }

            let done = summary.completed + summary.blocked + summary.failed;
            tracing::info!(
                "Progress: {}/{} sites done, {} pages, {:.1}s elapsed",
                done,
                summary.sites,
                summary.pages_visited,
                start_time.elapsed().as_secs_f64()
            );
        }

        summary.cancelled |= self.cancel.is_cancelled();
        summary
    }
}

/// Opens the store and registers the configured sites
///
/// An unreachable store is a configuration error and fatal to the run.
pub fn prepare_store(config: &Config) -> Result<SharedStorage, ConfigError> {
    let storage = open_storage(Path::new(&config.output.database_path))
        .map_err(|e| ConfigError::Store(e.to_string()))?;
    let storage = share(storage);

    {
        let mut guard = lock_storage(&storage).map_err(|e| ConfigError::Store(e.to_string()))?;
        for entry in &config.sites {
            if let Err(e) = guard.upsert_site(&SiteRecord::from(entry)) {
                tracing::warn!(site_id = entry.id, error = %e, "Failed to register site");
            }
        }
    }

    Ok(storage)
}

/// Registered sites matching a selection
pub fn select_sites(
    storage: &SharedStorage,
    selection: &SiteSelection,
) -> Result<Vec<SiteRecord>, ConfigError> {
    let sites = lock_storage(storage)
        .and_then(|s| s.list_sites())
        .map_err(|e| ConfigError::Store(e.to_string()))?;
    Ok(selection.apply(sites))
}

/// Runs a complete crawl
///
/// This is the main entry point. It prepares the store and keyword set,
/// records a run, crawls the selected sites, and marks the run completed,
/// interrupted or failed.
///
/// # Example
///
/// ```no_run
/// use schedule_scout::config::load_config_with_hash;
/// use schedule_scout::crawler::{run_crawl, SiteSelection};
/// use schedule_scout::events::TracingSink;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("scout.toml"))?;
/// let selection = SiteSelection { limit: Some(10), ..Default::default() };
/// let summary = run_crawl(config, &hash, &selection, Arc::new(TracingSink)).await?;
/// println!("{} facts found", summary.facts_found);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    selection: &SiteSelection,
    events: Arc<dyn EventSink>,
) -> Result<CrawlSummary, ScoutError> {
    let storage = prepare_store(&config)?;
    let keywords = load_keywords(&config.keywords, Some(&storage)).map_err(ConfigError::from)?;
    let sites = select_sites(&storage, selection)?;

    let run_id = lock_storage(&storage)
        .and_then(|mut s| s.create_run(config_hash))
        .map_err(|e| ConfigError::Store(e.to_string()))?;
    tracing::info!("Starting run {} over {} sites", run_id, sites.len());

    let ctx = match CrawlerContext::new(config, keywords, storage.clone()) {
        Ok(ctx) => Arc::new(ctx.with_events(events)),
        Err(e) => {
            finish_run(&storage, run_id, RunStatus::Failed);
            return Err(e);
        }
    };

    let coordinator = Coordinator::new(ctx);
    let cancel = coordinator.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping sessions");
            cancel.cancel();
        }
    });

    let summary = coordinator.run(sites).await;
    interrupt.abort();

    let status = if summary.cancelled {
        RunStatus::Interrupted
    } else {
        RunStatus::Completed
    };
    finish_run(&storage, run_id, status);

    tracing::info!(
        "Run {} {}: {} sites, {} blocked, {} failed, {} facts",
        run_id,
        status.to_db_string(),
        summary.sites,
        summary.blocked,
        summary.failed,
        summary.facts_found
    );
    Ok(summary)
}

fn finish_run(storage: &SharedStorage, run_id: i64, status: RunStatus) {
    let finished = lock_storage(storage).and_then(|mut s| s.finish_run(run_id, status));
    if let Err(e) = finished {
        tracing::error!(run_id, error = %e, "Failed to record run status");
    }
}
