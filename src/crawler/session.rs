//! One site's crawl session
//!
//! A session is a single cooperative loop: pop the best candidate, pass it
//! through the gate, fetch it under a breaker, score and record the visit,
//! and queue the page's links. Once the budget is spent or the frontier is
//! empty, the extraction chain runs on the best candidate pages for each
//! schedule type and the results are upserted.
//!
//! A root request that comes back blocked ends the session immediately.
//! Every URL is requested at most once per session: discovery's requests are
//! recorded as visits, and redirect targets count as visited.

use crate::breaker::{BreakerRegistry, OperationType};
use crate::crawler::context::CrawlerContext;
use crate::crawler::fetcher::{fetch, fetch_rendered, Expect, FetchOutcome, FetchedPage};
use crate::crawler::parser::parse_page;
use crate::events::LifecycleEvent;
use crate::extraction::{
    keyword_pass, ExtractionChain, ExtractionOutcome, ExtractionResult, ScheduleType,
};
use crate::frontier::{
    CrawlCandidate, Discovery, DiscoveryFetch, Frontier, PageBudget, Prioritizer, FORCED_PRIORITY,
};
use crate::gate::{assess_response, BlockingAssessment, BlockingType, GateDecision, RobotsDecision};
use crate::storage::{lock_storage, SiteRecord};
use crate::tracker::{load_golden_urls, score_content, QualityScore, VisitResult, VisitTracker};
use crate::url::{is_crawlable_link, normalize_url, registrable_domain};
use crate::{ScoutError, UrlError};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub site_id: i64,
    pub pages_visited: u32,
    pub page_budget: u32,
    /// Set when the site root was blocked
    pub blocked: Option<BlockingType>,
    pub results: Vec<ExtractionResult>,
    /// Records still unsaved after the final batch save
    pub unsaved: usize,
    pub cancelled: bool,
}

impl SessionReport {
    /// Number of schedule types with a result other than "not found"
    pub fn facts_found(&self) -> usize {
        self.results.iter().filter(|r| r.found()).count()
    }
}

/// A fetched page kept for the extraction phase
struct CandidatePage {
    html: String,
    text: String,
}

/// State of one site's crawl
pub struct CrawlSession<'a> {
    ctx: &'a CrawlerContext,
    site: SiteRecord,
    base: Url,
    site_domain: String,
    breakers: Arc<BreakerRegistry>,
    prioritizer: Prioritizer,
    frontier: Frontier,
    budget: PageBudget,
    tracker: VisitTracker,
    schedule_types: Vec<ScheduleType>,
    golden: Vec<(ScheduleType, String)>,
    candidates: BTreeMap<ScheduleType, Vec<Url>>,
    pages: HashMap<String, CandidatePage>,
    bot_blocks: u32,
    use_browser: bool,
    cancel: CancellationToken,
}

impl<'a> CrawlSession<'a> {
    /// Prepares a session; fails only when the site's base URL is unusable
    pub fn new(
        ctx: &'a CrawlerContext,
        site: SiteRecord,
        cancel: CancellationToken,
    ) -> Result<Self, ScoutError> {
        let base = normalize_url(&site.base_url)?;
        let site_domain = base
            .host_str()
            .map(registrable_domain)
            .ok_or(UrlError::MissingDomain)?;
        let schedule_types = ctx.config.extraction.schedule_types.clone();

        let golden: Vec<(ScheduleType, String)> = match load_golden_urls(&ctx.storage, site.id) {
            Ok(urls) => urls
                .into_iter()
                .filter(|g| schedule_types.contains(&g.schedule_type))
                .map(|g| (g.schedule_type, g.url))
                .collect(),
            Err(e) => {
                warn!(site_id = site.id, error = %e, "Could not load golden URLs");
                Vec::new()
            }
        };
        let golden_types: HashSet<ScheduleType> = golden.iter().map(|(t, _)| *t).collect();
        let budget = PageBudget::for_site(&ctx.config.crawler, golden_types.len());

        let prioritizer = Prioritizer::new(
            Arc::clone(&ctx.keywords),
            ctx.config.scoring.clone(),
            &base,
            &schedule_types,
        );

        Ok(Self {
            tracker: VisitTracker::new(site.id, ctx.storage.clone()),
            frontier: Frontier::new(),
            breakers: ctx.session_breakers(),
            candidates: BTreeMap::new(),
            pages: HashMap::new(),
            bot_blocks: 0,
            use_browser: false,
            ctx,
            site,
            base,
            site_domain,
            prioritizer,
            budget,
            schedule_types,
            golden,
            cancel,
        })
    }

    pub fn budget(&self) -> PageBudget {
        self.budget
    }

    /// Runs the session to completion
    pub async fn run(mut self) -> SessionReport {
        info!(
            site_id = self.site.id,
            base_url = %self.base,
            budget = self.budget.initial(),
            "Starting site session"
        );
        self.emit(LifecycleEvent::SiteStarted {
            site_id: self.site.id,
            base_url: self.base.to_string(),
            page_budget: self.budget.initial(),
            at: Utc::now(),
        });

        let root_html = match self.fetch_root().await {
            Ok(html) => html,
            Err(blocking_type) => return self.finish_blocked(blocking_type),
        };

        self.seed(root_html.as_deref()).await;
        let cancelled = self.crawl().await;
        let results = self.extract_all().await;
        let unsaved = self.batch_save(&results);

        let report = SessionReport {
            site_id: self.site.id,
            pages_visited: self.budget.used(),
            page_budget: self.budget.initial(),
            blocked: None,
            unsaved,
            cancelled,
            results,
        };
        info!(
            site_id = report.site_id,
            pages = report.pages_visited,
            facts = report.facts_found(),
            "Site session complete"
        );
        self.emit(LifecycleEvent::SiteCompleted {
            site_id: report.site_id,
            pages_visited: report.pages_visited,
            blocked: None,
            facts_found: report.facts_found(),
            at: Utc::now(),
        });
        report
    }

    /// Fetches and assesses the site root
    ///
    /// Returns the root HTML when there is any, or the blocking type when
    /// the site must not be crawled further.
    async fn fetch_root(&mut self) -> Result<Option<String>, BlockingType> {
        let base = self.base.clone();
        self.frontier.mark_visited(base.as_str());

        if self.ctx.gate.admit(&base).await == GateDecision::Disallowed {
            self.save_assessment(&BlockingAssessment::robots_disallowed(base.as_str()));
            self.tracker.record(VisitResult::failed(
                self.site.id,
                base.as_str(),
                BlockingType::RobotsDisallowed.to_db_string(),
                "robots.txt disallows the site root",
            ));
            return Err(BlockingType::RobotsDisallowed);
        }

        self.budget.consume();
        let breaker = self.breakers.get(OperationType::PageLoad);
        let outcome = fetch(
            &self.ctx.client,
            self.ctx.profiles.draw(),
            &base,
            &breaker,
            Expect::Html,
        )
        .await;

        let html = match outcome {
            FetchOutcome::Page(page) => {
                self.mark_final_url(&page.url);
                let assessment =
                    assess_response(page.status, &page.headers, &page.body, RobotsDecision::Allowed);
                self.save_assessment(&assessment);
                if let (true, Some(kind)) = (assessment.is_blocked, assessment.blocking_type) {
                    warn!(
                        site_id = self.site.id,
                        blocking_type = %kind,
                        evidence = ?assessment.evidence,
                        "Site root is blocked"
                    );
                    self.tracker.record(blocked_visit(self.site.id, &page, kind));
                    return Err(kind);
                }
                if (200..300).contains(&page.status) {
                    let body = page.body.clone();
                    self.process_page(page);
                    Some(body)
                } else {
                    self.tracker.record(status_visit(self.site.id, &page));
                    None
                }
            }
            other => {
                self.save_assessment(&BlockingAssessment::clear(None, RobotsDecision::Allowed));
                self.record_unusable(base.as_str(), other);
                None
            }
        };

        self.progress(base.as_str());
        Ok(html)
    }

    /// Queues golden URLs and the discovery chain's seeds
    async fn seed(&mut self, root_html: Option<&str>) {
        let golden = std::mem::take(&mut self.golden);
        for (schedule_type, url) in &golden {
            debug!(site_id = self.site.id, %schedule_type, url = %url, "Forcing golden URL");
            self.frontier.push(CrawlCandidate::new(
                self.site.id,
                url,
                FORCED_PRIORITY,
                None,
            ));
        }

        let tokens = self.ctx.keywords.tokens(&self.schedule_types);
        let discovery = Discovery {
            client: &self.ctx.client,
            profiles: &self.ctx.profiles,
            gate: &self.ctx.gate,
            breakers: &self.breakers,
            browser: self.ctx.browser.as_deref(),
            cache: &self.ctx.discovery_cache,
            config: &self.ctx.config.crawler,
            tokens: &tokens,
        };
        let run = discovery.run(&self.base, &self.site_domain, root_html).await;
        for fetched in run.fetches {
            self.absorb_discovery_fetch(fetched);
        }

        let base = self.base.to_string();
        for url in run.result.urls() {
            self.enqueue(url, Some(&base));
        }
        debug!(
            site_id = self.site.id,
            queued = self.frontier.len(),
            "Frontier seeded"
        );
    }

    /// Records a request discovery made
    ///
    /// A verified schedule page is processed like a crawled page and spends
    /// budget. A URL this session already recorded keeps its record.
    fn absorb_discovery_fetch(&mut self, fetched: DiscoveryFetch) {
        let key = normalize_url(fetched.url.as_str())
            .map(|u| u.to_string())
            .unwrap_or_else(|_| fetched.url.to_string());
        if !self.frontier.mark_visited(&key) {
            return;
        }

        let verified = fetched.verified_page();
        match fetched.outcome {
            FetchOutcome::Page(page) if verified => {
                debug!(site_id = self.site.id, url = %page.url, "Reusing verified schedule page");
                self.budget.consume();
                self.handle_page(page);
                self.progress(&key);
            }
            FetchOutcome::Page(page) if (200..300).contains(&page.status) => {
                self.tracker.record(document_visit(self.site.id, &page));
            }
            FetchOutcome::Page(page) => self.tracker.record(status_visit(self.site.id, &page)),
            other => self.record_unusable(fetched.url.as_str(), other),
        }
    }

    /// Marks where a request actually ended up so redirects are not refetched
    fn mark_final_url(&mut self, final_url: &Url) {
        if let Ok(url) = normalize_url(final_url.as_str()) {
            self.frontier.mark_visited(url.as_str());
        }
    }

    /// The page loop; returns true if it stopped on cancellation
    async fn crawl(&mut self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                info!(site_id = self.site.id, "Session cancelled");
                return true;
            }
            if self.budget.is_exhausted() {
                debug!(site_id = self.site.id, "Page budget exhausted");
                return false;
            }
            let Some(candidate) = self.frontier.pop() else {
                debug!(site_id = self.site.id, "Frontier is empty");
                return false;
            };
            let Ok(url) = Url::parse(&candidate.url) else {
                continue;
            };

            if self.ctx.gate.admit(&url).await == GateDecision::Disallowed {
                self.tracker.record(VisitResult::failed(
                    self.site.id,
                    url.as_str(),
                    BlockingType::RobotsDisallowed.to_db_string(),
                    "robots.txt disallows this URL",
                ));
                continue;
            }

            self.budget.consume();
            let outcome = self.fetch_page(&url).await;
            match outcome {
                FetchOutcome::Page(page) => self.handle_page(page),
                other => self.record_unusable(url.as_str(), other),
            }
            self.progress(url.as_str());
        }
    }

    async fn fetch_page(&self, url: &Url) -> FetchOutcome {
        if let (true, Some(browser)) = (self.use_browser, self.ctx.browser.as_deref()) {
            let breaker = self.breakers.get(OperationType::ScriptExecution);
            return fetch_rendered(browser, url, &breaker).await;
        }
        let breaker = self.breakers.get(OperationType::PageLoad);
        fetch(
            &self.ctx.client,
            self.ctx.profiles.draw(),
            url,
            &breaker,
            Expect::Html,
        )
        .await
    }

    /// Assesses a non-root page before processing it
    fn handle_page(&mut self, page: FetchedPage) {
        self.mark_final_url(&page.url);
        let assessment =
            assess_response(page.status, &page.headers, &page.body, RobotsDecision::Allowed);

        if let (true, Some(kind)) = (assessment.is_blocked, assessment.blocking_type) {
            debug!(url = %page.url, blocking_type = %kind, "Page blocked");
            self.tracker.record(blocked_visit(self.site.id, &page, kind));
            if kind.is_bot_protection() {
                self.bot_blocks += 1;
                if self.bot_blocks >= self.ctx.config.crawler.block_streak
                    && !self.use_browser
                    && self.ctx.browser.is_some()
                {
                    info!(site_id = self.site.id, "Switching to browser fetches");
                    self.use_browser = true;
                }
            }
            return;
        }
        self.bot_blocks = 0;

        if (200..300).contains(&page.status) {
            self.process_page(page);
        } else {
            self.tracker.record(status_visit(self.site.id, &page));
        }
    }

    /// Records a usable page, remembers it as a candidate, and queues its links
    fn process_page(&mut self, page: FetchedPage) {
        let parsed = parse_page(&page.body, &page.url);
        let findings = keyword_pass(&page.body, &self.schedule_types);
        let found = !findings.is_empty();

        self.tracker.record(VisitResult {
            site_id: self.site.id,
            url: page.url.to_string(),
            visited_at: Utc::now(),
            http_status: Some(page.status),
            response_time_ms: page.elapsed.as_millis() as u64,
            content_type: page.content_type.clone(),
            content_size: page.body.len() as u64,
            extraction_attempted: true,
            extraction_success: found,
            schedule_data_found: found,
            quality_score: score_content(Some(&parsed.text), found),
            error_type: None,
            error_message: None,
        });

        let lower = parsed.text.to_lowercase();
        let mut is_candidate = false;
        for schedule_type in &self.schedule_types {
            let mentioned = findings.iter().any(|(t, _)| t == schedule_type)
                || self
                    .ctx
                    .keywords
                    .positive(*schedule_type)
                    .iter()
                    .any(|k| lower.contains(&k.keyword));
            if mentioned {
                let urls = self.candidates.entry(*schedule_type).or_default();
                if !urls.contains(&page.url) {
                    urls.push(page.url.clone());
                }
                is_candidate = true;
            }
        }

        let source = page.url.to_string();
        for link in &parsed.links {
            self.enqueue(link, Some(&source));
        }

        if is_candidate {
            self.pages.insert(
                page.url.to_string(),
                CandidatePage {
                    html: page.body,
                    text: parsed.text,
                },
            );
        }
    }

    fn enqueue(&mut self, link: &str, source: Option<&str>) {
        let Ok(url) = normalize_url(link) else {
            return;
        };
        if !is_crawlable_link(&url, &self.site_domain) {
            return;
        }
        let priority = self.prioritizer.priority(&url);
        self.frontier.push(CrawlCandidate::new(
            self.site.id,
            url.as_str(),
            priority,
            source.map(str::to_string),
        ));
    }

    fn record_unusable(&mut self, url: &str, outcome: FetchOutcome) {
        let visit = match outcome {
            FetchOutcome::Page(page) => status_visit(self.site.id, &page),
            FetchOutcome::ContentMismatch {
                status,
                content_type,
                elapsed,
                ..
            } => VisitResult {
                http_status: Some(status),
                response_time_ms: elapsed.as_millis() as u64,
                content_type: Some(content_type.clone()),
                ..VisitResult::failed(
                    self.site.id,
                    url,
                    "content_type",
                    format!("not an HTML document: {}", content_type),
                )
            },
            FetchOutcome::Network {
                kind,
                message,
                elapsed,
            } => {
                warn!(site_id = self.site.id, url = %url, kind = kind.as_str(), error = %message, "Fetch failed");
                VisitResult {
                    response_time_ms: elapsed.as_millis() as u64,
                    ..VisitResult::failed(self.site.id, url, kind.as_str(), message)
                }
            }
        };
        self.tracker.record(visit);
    }

    /// Runs the extraction chain for every schedule type of interest
    async fn extract_all(&mut self) -> Vec<ExtractionResult> {
        let mut chain = ExtractionChain::new(
            self.ctx.ai.clone(),
            self.breakers.get(OperationType::AiContentAnalysis),
            self.ctx.config.extraction.clone(),
            Arc::clone(&self.ctx.keywords),
        );
        let attempts = self.ctx.config.crawler.max_extraction_attempts.max(1);
        let golden_min = self.ctx.config.extraction.golden_min_confidence;

        let mut results = Vec::with_capacity(self.schedule_types.len());
        for schedule_type in self.schedule_types.clone() {
            let urls = self.candidates.get(&schedule_type).cloned().unwrap_or_default();
            let ranked = self.prioritizer.rank(&urls, schedule_type);

            let mut result = None;
            for (url, score) in ranked.iter().take(attempts) {
                let Some(page) = self.pages.get(url.as_str()) else {
                    continue;
                };
                debug!(%schedule_type, url = %url, score, "Extracting from candidate");
                if let ExtractionOutcome::Found { method, finding } =
                    chain.extract(&page.html, &page.text, schedule_type).await
                {
                    result = Some(ExtractionResult::from_finding(
                        self.site.id,
                        schedule_type,
                        method,
                        finding,
                        Some(url.to_string()),
                    ));
                    break;
                }
            }

            let result = result.unwrap_or_else(|| {
                let best = ranked.first().map(|(u, _)| u.to_string());
                ExtractionResult::not_found(self.site.id, schedule_type, best)
            });

            self.save_result(&result);
            if result.found() {
                if let (true, Some(url)) = (result.confidence >= golden_min, &result.source_url) {
                    self.tracker
                        .record_golden(schedule_type, url, result.confidence);
                }
                self.emit(LifecycleEvent::FactSaved {
                    site_id: self.site.id,
                    schedule_type,
                    method: result.method,
                    confidence: result.confidence,
                    at: Utc::now(),
                });
            }
            info!(
                site_id = self.site.id,
                %schedule_type,
                method = %result.method,
                confidence = result.confidence,
                "Extraction result"
            );
            results.push(result);
        }
        results
    }

    fn save_result(&self, result: &ExtractionResult) {
        let saved = lock_storage(&self.ctx.storage).and_then(|mut s| s.upsert_extraction(result));
        if let Err(e) = saved {
            warn!(site_id = self.site.id, schedule_type = %result.schedule_type, error = %e, "Failed to save extraction result");
        }
    }

    fn save_assessment(&self, assessment: &BlockingAssessment) {
        let saved = lock_storage(&self.ctx.storage)
            .and_then(|mut s| s.save_blocking_assessment(self.site.id, assessment));
        if let Err(e) = saved {
            warn!(site_id = self.site.id, error = %e, "Failed to save blocking assessment");
        }
    }

    /// Best-effort final save of everything the session produced
    ///
    /// Returns how many records are still unsaved.
    fn batch_save(&mut self, results: &[ExtractionResult]) -> usize {
        let mut unsaved = self.tracker.flush();

        match lock_storage(&self.ctx.storage) {
            Ok(mut storage) => {
                for result in results {
                    if storage.upsert_extraction(result).is_err() {
                        unsaved += 1;
                    }
                }
                for candidate in self.frontier.candidates() {
                    if storage.upsert_candidate(candidate).is_err() {
                        unsaved += 1;
                    }
                }
            }
            Err(e) => {
                warn!(site_id = self.site.id, error = %e, "Batch save failed");
                unsaved += results.len() + self.frontier.candidates().count();
            }
        }

        if unsaved > 0 {
            warn!(site_id = self.site.id, unsaved, "Some records could not be saved");
        }
        unsaved
    }

    fn finish_blocked(mut self, blocking_type: BlockingType) -> SessionReport {
        let unsaved = self.tracker.flush();
        self.emit(LifecycleEvent::SiteCompleted {
            site_id: self.site.id,
            pages_visited: self.budget.used(),
            blocked: Some(blocking_type),
            facts_found: 0,
            at: Utc::now(),
        });
        SessionReport {
            site_id: self.site.id,
            pages_visited: self.budget.used(),
            page_budget: self.budget.initial(),
            blocked: Some(blocking_type),
            results: Vec::new(),
            unsaved,
            cancelled: false,
        }
    }

    fn progress(&self, url: &str) {
        let quality = self
            .tracker
            .visits()
            .last()
            .map(|v| v.quality_score)
            .unwrap_or(QualityScore::Error);
        self.emit(LifecycleEvent::PageProgress {
            site_id: self.site.id,
            url: url.to_string(),
            pages_visited: self.budget.used(),
            page_budget: self.budget.initial(),
            quality,
            at: Utc::now(),
        });
    }

    fn emit(&self, event: LifecycleEvent) {
        self.ctx.events.emit(event);
    }
}

/// Visit for a response whose status or content left nothing to assess
fn status_visit(site_id: i64, page: &FetchedPage) -> VisitResult {
    VisitResult {
        http_status: Some(page.status),
        response_time_ms: page.elapsed.as_millis() as u64,
        content_type: page.content_type.clone(),
        content_size: page.body.len() as u64,
        ..VisitResult::failed(
            site_id,
            page.url.as_str(),
            "http_status",
            format!("HTTP {}", page.status),
        )
    }
}

/// Visit for a fetched document that is not a page to extract from
fn document_visit(site_id: i64, page: &FetchedPage) -> VisitResult {
    VisitResult {
        site_id,
        url: page.url.to_string(),
        visited_at: Utc::now(),
        http_status: Some(page.status),
        response_time_ms: page.elapsed.as_millis() as u64,
        content_type: page.content_type.clone(),
        content_size: page.body.len() as u64,
        extraction_attempted: false,
        extraction_success: false,
        schedule_data_found: false,
        quality_score: QualityScore::Irrelevant,
        error_type: None,
        error_message: None,
    }
}

fn blocked_visit(site_id: i64, page: &FetchedPage, kind: BlockingType) -> VisitResult {
    VisitResult {
        error_type: Some(kind.to_db_string().to_string()),
        error_message: Some(format!("blocked: {}", kind)),
        ..status_visit(site_id, page)
    }
}

/// Crawls one site with the shared context
///
/// A base URL that cannot be parsed is the only error; everything else is
/// recorded and reported in the [`SessionReport`].
pub async fn run_session(
    ctx: &CrawlerContext,
    site: SiteRecord,
    cancel: CancellationToken,
) -> Result<SessionReport, ScoutError> {
    let session = CrawlSession::new(ctx, site, cancel)?;
    Ok(session.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, OutputConfig, PolitenessConfig, UserAgentConfig};
    use crate::events::ChannelSink;
    use crate::frontier::KeywordSet;
    use crate::storage::{share, SharedStorage, SqliteStorage};
    use crate::crawler::browser::{BrowserError, BrowserService, RenderedPage};
    use crate::extraction::{AiAnswer, AiBackend, AiError, ExtractionMethod};
    use crate::tracker::GoldenUrl;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> Config {
        Config {
            crawler: Default::default(),
            politeness: PolitenessConfig {
                default_crawl_delay_secs: 0.0,
                max_jitter_secs: 0.0,
                https_only: false,
                ..Default::default()
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestScout".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
                rotation: vec![],
            },
            output: OutputConfig {
                database_path: ":memory:".to_string(),
                summary_path: "summary.md".to_string(),
            },
            scoring: Default::default(),
            extraction: Default::default(),
            keywords: Default::default(),
            ai: None,
            browser: None,
            breakers: Default::default(),
            sites: vec![],
        }
    }

    fn context(storage: SharedStorage) -> CrawlerContext {
        let config = create_test_config();
        let client = reqwest::Client::new();
        CrawlerContext::with_client(config, client, KeywordSet::fallback(), storage)
    }

    fn site(server: &MockServer) -> SiteRecord {
        SiteRecord {
            id: 1,
            name: "St. Test".to_string(),
            base_url: format!("{}/", server.uri()),
            group: None,
        }
    }

    async fn page(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_links_followed_and_fact_saved() {
        let server = MockServer::start().await;
        page(
            &server,
            "/",
            r#"<html><body><h1>Welcome</h1><a href="/sacraments/confession">Confession</a></body></html>"#,
        )
        .await;
        page(
            &server,
            "/sacraments/confession",
            "<html><body><h2>Confession</h2><p>Saturdays 3:00 - 4:00 PM</p></body></html>",
        )
        .await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let (sink, mut events) = ChannelSink::new();
        let ctx = context(storage.clone()).with_events(Arc::new(sink));

        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.blocked, None);
        assert!(report.pages_visited >= 2);
        let reconciliation = report
            .results
            .iter()
            .find(|r| r.schedule_type == ScheduleType::Reconciliation)
            .unwrap();
        assert!(reconciliation.found());
        assert!(reconciliation
            .source_url
            .as_deref()
            .unwrap()
            .ends_with("/sacraments/confession"));

        let stored = lock_storage(&storage)
            .unwrap()
            .get_extraction(1, ScheduleType::Reconciliation)
            .unwrap()
            .unwrap();
        assert_eq!(stored.method, reconciliation.method);

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names.first(), Some(&"site_started"));
        assert_eq!(names.last(), Some(&"site_completed"));
        assert!(names.contains(&"fact_saved"));
    }

    #[tokio::test]
    async fn test_blocked_root_stops_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(403).set_body_raw("Forbidden", "text/html"))
            .expect(1)
            .mount(&server)
            .await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage.clone());
        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.blocked, Some(BlockingType::Forbidden403));
        assert_eq!(report.pages_visited, 1);
        assert!(report.results.is_empty());

        let assessment = lock_storage(&storage)
            .unwrap()
            .get_blocking_assessment(1)
            .unwrap()
            .unwrap();
        assert!(assessment.is_blocked);
        assert_eq!(assessment.blocking_type, Some(BlockingType::Forbidden403));
    }

    #[tokio::test]
    async fn test_no_candidates_yields_not_found() {
        let server = MockServer::start().await;
        page(&server, "/", "<html><body><p>Parish picnic on Sunday</p></body></html>").await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage);
        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results.len(), ScheduleType::all().len());
        for result in &report.results {
            assert!(!result.found());
            assert_eq!(result.schedule_text, "Information not found");
        }
        assert_eq!(report.facts_found(), 0);
    }

    #[tokio::test]
    async fn test_golden_url_shrinks_budget() {
        let server = MockServer::start().await;
        let storage = share(SqliteStorage::new_in_memory().unwrap());
        lock_storage(&storage)
            .unwrap()
            .record_golden_url(&GoldenUrl {
                site_id: 1,
                schedule_type: ScheduleType::Adoration,
                url: format!("{}/adoration", server.uri()),
                confidence: 90,
                recorded_at: Utc::now(),
            })
            .unwrap();

        let ctx = context(storage);
        let session = CrawlSession::new(&ctx, site(&server), CancellationToken::new()).unwrap();
        assert_eq!(session.budget().initial(), 35);
    }

    #[tokio::test]
    async fn test_cancelled_session_still_reports() {
        let server = MockServer::start().await;
        page(&server, "/", "<html><body><a href=\"/a\">A</a></body></html>").await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_session(&ctx, site(&server), cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.pages_visited, 1);
        assert_eq!(report.results.len(), ScheduleType::all().len());
    }

    /// Answers with a fixed high-confidence schedule for one type
    struct ConfidentAi {
        schedule_type: ScheduleType,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AiBackend for ConfidentAi {
        async fn analyze(&self, _text: &str, schedule_type: ScheduleType) -> Result<AiAnswer, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if schedule_type != self.schedule_type {
                return Ok(AiAnswer::default());
            }
            Ok(AiAnswer {
                found: true,
                days: vec!["Saturday".to_string()],
                times: vec!["3:00 PM".to_string()],
                frequency: None,
                schedule_text: "Saturday 3:00 PM - 4:00 PM".to_string(),
                confidence: 95.0,
            })
        }
    }

    /// Renders every page from a canned body, counting renders of `/news`
    struct CannedBrowser {
        news_renders: AtomicUsize,
    }

    #[async_trait]
    impl BrowserService for CannedBrowser {
        async fn render(&self, url: &Url) -> Result<RenderedPage, BrowserError> {
            let html = if url.path() == "/news" {
                self.news_renders.fetch_add(1, Ordering::SeqCst);
                "<html><body><h2>Mass Times</h2><p>Sunday Mass 9:00 AM</p></body></html>"
            } else {
                "<html><body><p>Rendered</p></body></html>"
            };
            Ok(RenderedPage {
                url: url.to_string(),
                status: Some(200),
                html: html.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_confident_ai_answer_is_saved_and_golden() {
        let server = MockServer::start().await;
        page(
            &server,
            "/",
            r#"<html><body><a href="/confession">Confession</a></body></html>"#,
        )
        .await;
        page(
            &server,
            "/confession",
            "<html><body><h2>Confession</h2><p>Saturdays 3:00 - 4:00 PM</p></body></html>",
        )
        .await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ai = Arc::new(ConfidentAi {
            schedule_type: ScheduleType::Reconciliation,
            calls: AtomicUsize::new(0),
        });
        let ctx = context(storage.clone()).with_ai(ai.clone());

        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        let reconciliation = report
            .results
            .iter()
            .find(|r| r.schedule_type == ScheduleType::Reconciliation)
            .unwrap();
        assert_eq!(reconciliation.method, ExtractionMethod::Ai);
        assert_eq!(reconciliation.confidence, 95);
        assert!(ai.calls.load(Ordering::SeqCst) >= 1);

        let golden = lock_storage(&storage).unwrap().golden_urls(1).unwrap();
        assert!(golden
            .iter()
            .any(|g| g.schedule_type == ScheduleType::Reconciliation && g.url.ends_with("/confession")));
    }

    #[tokio::test]
    async fn test_bot_block_streak_switches_to_browser() {
        let server = MockServer::start().await;
        page(
            &server,
            "/",
            r#"<html><body>
                <a href="/confession-a">Confession</a>
                <a href="/confession-b">Confession</a>
                <a href="/news">News</a>
            </body></html>"#,
        )
        .await;
        for route in ["/confession-a", "/confession-b"] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(403).set_body_raw("Forbidden", "text/html"))
                .mount(&server)
                .await;
        }

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let browser = Arc::new(CannedBrowser {
            news_renders: AtomicUsize::new(0),
        });
        let ctx = context(storage).with_browser(browser.clone());

        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.blocked, None);
        assert_eq!(browser.news_renders.load(Ordering::SeqCst), 1);
        let requested: Vec<String> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert!(!requested.iter().any(|p| p == "/news"));

        let mass = report
            .results
            .iter()
            .find(|r| r.schedule_type == ScheduleType::Mass)
            .unwrap();
        assert!(mass.found());
        assert!(mass.source_url.as_deref().unwrap().ends_with("/news"));
    }

    fn requests_to(requests: &[wiremock::Request], route: &str) -> usize {
        requests.iter().filter(|r| r.url.path() == route).count()
    }

    #[tokio::test]
    async fn test_verified_schedule_path_is_fetched_once() {
        let server = MockServer::start().await;
        page(
            &server,
            "/",
            r#"<html><body><h1>Welcome</h1><a href="/confession">Confession</a></body></html>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/confession"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><body><h2>Confession</h2><p>Saturdays 3:00 - 4:00 PM</p></body></html>",
                "text/html",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage);
        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests_to(&requests, "/confession"), 1);
        assert_eq!(requests_to(&requests, "/"), 1);
        assert_eq!(report.pages_visited, 2);

        let reconciliation = report
            .results
            .iter()
            .find(|r| r.schedule_type == ScheduleType::Reconciliation)
            .unwrap();
        assert!(reconciliation.found());
        assert!(reconciliation.source_url.as_deref().unwrap().ends_with("/confession"));
    }

    #[tokio::test]
    async fn test_discovery_requests_are_recorded_as_visits() {
        let server = MockServer::start().await;
        page(&server, "/", "<html><body><p>Welcome</p></body></html>").await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage.clone());
        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        // Missing sitemaps and schedule paths do not spend page budget
        assert_eq!(report.pages_visited, 1);

        let requests = server.received_requests().await.unwrap_or_default();
        let visits = lock_storage(&storage).unwrap().visits_for_site(1).unwrap();
        assert_eq!(visits.len(), requests.iter().filter(|r| r.url.path() != "/robots.txt").count());

        let sitemap = visits.iter().find(|v| v.url.ends_with("/sitemap.xml")).unwrap();
        assert_eq!(sitemap.http_status, Some(404));
        let confession = visits.iter().find(|v| v.url.ends_with("/confession")).unwrap();
        assert_eq!(confession.http_status, Some(404));
        assert_eq!(confession.error_type.as_deref(), Some("http_status"));
    }

    #[tokio::test]
    async fn test_sitemap_read_is_recorded() {
        let server = MockServer::start().await;
        page(&server, "/", "<html><body><p>Welcome</p></body></html>").await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"><url><loc>{}/news</loc></url></urlset>"#,
                    server.uri()
                ),
                "application/xml",
            ))
            .mount(&server)
            .await;
        page(&server, "/news", "<html><body><p>Parish news</p></body></html>").await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage.clone());
        run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        let visits = lock_storage(&storage).unwrap().visits_for_site(1).unwrap();
        let sitemap = visits.iter().find(|v| v.url.ends_with("/sitemap.xml")).unwrap();
        assert_eq!(sitemap.http_status, Some(200));
        assert_eq!(sitemap.error_type, None);
        assert_eq!(sitemap.quality_score, QualityScore::Irrelevant);
        assert!(visits.iter().any(|v| v.url.ends_with("/news")));
    }

    #[tokio::test]
    async fn test_redirect_target_is_not_refetched() {
        let server = MockServer::start().await;
        page(
            &server,
            "/",
            r#"<html><body><a href="/mass-info">Mass</a></body></html>"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/mass-info"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/sunday-mass-2024"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sunday-mass-2024"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<html><body><h2>Mass Times</h2><p>Sunday Mass 9:00 AM</p>
                    <a href="/sunday-mass-2024">Sunday Mass</a></body></html>"#,
                "text/html",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage);
        let report = run_session(&ctx, site(&server), CancellationToken::new())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests_to(&requests, "/sunday-mass-2024"), 1);
        let mass = report
            .results
            .iter()
            .find(|r| r.schedule_type == ScheduleType::Mass)
            .unwrap();
        assert!(mass.found());
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_an_error() {
        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let ctx = context(storage);
        let site = SiteRecord {
            id: 9,
            name: "Broken".to_string(),
            base_url: "not a url".to_string(),
            group: None,
        };
        assert!(run_session(&ctx, site, CancellationToken::new()).await.is_err());
    }
}
