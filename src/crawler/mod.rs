//! Crawler module for site sessions
//!
//! This module contains the core crawling logic, including:
//! - Breaker-guarded HTTP fetching and the headless-browser fallback
//! - HTML parsing, text cleaning and link extraction
//! - The per-site crawl session
//! - Run-level coordination across concurrent workers

pub mod browser;
mod context;
mod coordinator;
pub mod fetcher;
pub mod parser;
mod session;

pub use browser::{BrowserError, BrowserService, HttpRenderService, RenderedPage};
pub use context::CrawlerContext;
pub use coordinator::{
    prepare_store, run_crawl, select_sites, Coordinator, CrawlSummary, SiteSelection,
};
pub use fetcher::{
    build_http_client, fetch, fetch_rendered, Expect, FetchOutcome, FetchedPage,
    NetworkErrorKind, ProfilePool, RequestProfile,
};
pub use parser::{clean_text, extract_nav_links, parse_page, ParsedPage};
pub use session::{run_session, CrawlSession, SessionReport};
