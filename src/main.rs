//! Schedule Scout main entry point
//!
//! This is the command-line interface for the schedule-discovery crawler.

use anyhow::Context;
use clap::Parser;
use schedule_scout::config::{load_config_with_hash, Config};
use schedule_scout::crawler::{run_crawl, SiteSelection};
use schedule_scout::events::{EventSink, FanoutSink, StalenessMonitor, TracingSink};
use schedule_scout::output::{generate_markdown_summary, load_statistics, print_statistics};
use schedule_scout::storage::{open_storage, SiteRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// A site with no lifecycle event for this long is reported as stale
const STALE_AFTER: Duration = Duration::from_secs(300);

const STALE_POLL: Duration = Duration::from_secs(30);

/// Schedule Scout: a respectful schedule-discovery crawler
///
/// Schedule Scout visits parish websites under a per-site page budget,
/// respecting robots.txt and rate limits, and extracts confession,
/// adoration and mass schedules into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "schedule-scout")]
#[command(version)]
#[command(about = "A respectful schedule-discovery crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "scout.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Process at most this many sites
    #[arg(long, value_name = "N")]
    sites: Option<usize>,

    /// Process only the site with this ID
    #[arg(long, value_name = "ID")]
    site_id: Option<i64>,

    /// Process only sites in this group
    #[arg(long, value_name = "GROUP")]
    group: Option<String>,

    /// Override the per-site page budget
    #[arg(long, value_name = "PAGES")]
    max_pages: Option<u32>,

    /// Validate config and show which sites would be crawled
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Write the markdown summary of current results and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

impl Cli {
    fn selection(&self) -> SiteSelection {
        SiteSelection {
            limit: self.sites,
            site_id: self.site_id,
            group: self.group.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(pages) = cli.max_pages {
        config.crawler.max_pages_per_site = pages;
    }

    if cli.dry_run {
        handle_dry_run(&config, &cli.selection());
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_crawl(config, &config_hash, &cli.selection()).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("schedule_scout=info,warn"),
            1 => EnvFilter::new("schedule_scout=debug,info"),
            2 => EnvFilter::new("schedule_scout=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the configuration and selected sites
fn handle_dry_run(config: &Config, selection: &SiteSelection) {
    println!("=== Schedule Scout Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Page budget per site: {}", config.crawler.max_pages_per_site);
    println!("  Minimum budget: {}", config.crawler.min_pages_per_site);
    println!("  Concurrent sites: {}", config.crawler.max_concurrent_sites);
    println!("  Breaker scope: {:?}", config.crawler.breaker_scope);
    println!(
        "  Schedule types: {}",
        config
            .extraction
            .schedule_types
            .iter()
            .map(|t| t.to_db_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    println!("\nUser Agent:");
    println!("  Identity: {}", config.user_agent.identity());
    println!("  Rotation pool: {}", config.user_agent.rotation.len());

    println!("\nServices:");
    match &config.ai {
        Some(ai) => println!("  AI: {} ({})", ai.model, ai.endpoint),
        None => println!("  AI: disabled"),
    }
    match &config.browser {
        Some(browser) => println!("  Browser: {}", browser.endpoint),
        None => println!("  Browser: disabled"),
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);

    let sites = selection.apply(config.sites.iter().map(SiteRecord::from).collect());
    println!("\nSelected Sites ({} of {}):", sites.len(), config.sites.len());
    for site in &sites {
        match &site.group {
            Some(group) => println!("  - [{}] {} <{}> ({})", site.id, site.name, site.base_url, group),
            None => println!("  - [{}] {} <{}>", site.id, site.name, site.base_url),
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: writes the markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Schedule Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let rows = generate_markdown_summary(&storage, Path::new(&config.output.summary_path))?;

    println!(
        "✓ Summary with {} results exported to: {}",
        rows, config.output.summary_path
    );
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, selection: &SiteSelection) -> anyhow::Result<()> {
    tracing::info!(
        "Registered sites: {}, page budget: {}",
        config.sites.len(),
        config.crawler.max_pages_per_site
    );

    let monitor = Arc::new(StalenessMonitor::new(STALE_AFTER));
    let events: Arc<dyn EventSink> = Arc::new(FanoutSink::new(vec![
        Arc::new(TracingSink),
        Arc::clone(&monitor) as Arc<dyn EventSink>,
    ]));

    let watcher = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STALE_POLL);
        loop {
            ticker.tick().await;
            for site_id in monitor.stale_sites(Instant::now()) {
                tracing::warn!(
                    site_id,
                    "No progress for {}s, session looks stale",
                    monitor.window().as_secs()
                );
            }
        }
    });

    let result = run_crawl(config, config_hash, selection, events).await;
    watcher.abort();

    let summary = result.context("Crawl failed")?;
    tracing::info!(
        "Crawl finished: {} sites ({} completed, {} blocked, {} failed), {} pages, {} facts",
        summary.sites,
        summary.completed,
        summary.blocked,
        summary.failed,
        summary.pages_visited,
        summary.facts_found
    );
    if summary.cancelled {
        tracing::warn!("Crawl was interrupted; partial results were saved");
    }
    Ok(())
}
