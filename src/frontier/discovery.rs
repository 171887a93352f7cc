//! Seed discovery
//!
//! A site's first candidates come from the first source that yields any:
//! sitemaps, conventional schedule paths, static navigation links,
//! browser-rendered navigation, then robots.txt rule paths. Results are
//! cached per normalized base URL for the life of the process.
//!
//! Every request discovery makes is handed back in [`DiscoveryRun::fetches`]
//! so the session can record it and reuse verified pages instead of
//! requesting them again.

use crate::breaker::{BreakerRegistry, OperationType};
use crate::config::CrawlerConfig;
use crate::crawler::browser::BrowserService;
use crate::crawler::fetcher::{fetch, fetch_rendered, Expect, FetchOutcome, NetworkErrorKind, ProfilePool};
use crate::crawler::parser::extract_nav_links;
use crate::frontier::prioritizer::path_mentions;
use crate::gate::{GateDecision, RespectfulGate};
use crate::robots::ParsedRobots;
use crate::url::{is_crawlable_link, normalize_base_url, normalize_url};
use reqwest::Client;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;
use tracing::{debug, info};
use url::Url;

const SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/wp-sitemap.xml",
    "/page-sitemap.xml",
    "/sitemap/sitemap.xml",
];

const SCHEDULE_PATHS: &[&str] = &[
    "/mass-times",
    "/mass-schedule",
    "/masses",
    "/confession",
    "/confessions",
    "/reconciliation",
    "/sacraments/reconciliation",
    "/adoration",
    "/eucharistic-adoration",
    "/perpetual-adoration",
    "/schedule",
    "/schedules",
    "/weekly-schedule",
    "/parish-schedule",
    "/liturgy",
    "/worship",
    "/sacraments",
    "/hours",
    "/bulletin",
    "/about/mass-times",
];

/// Which discovery step produced the seeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Sitemap,
    ConventionalPaths,
    StaticNav,
    BrowserNav,
    RobotsRules,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::ConventionalPaths => "conventional_paths",
            Self::StaticNav => "static_nav",
            Self::BrowserNav => "browser_nav",
            Self::RobotsRules => "robots_rules",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryResult {
    Found {
        source: DiscoverySource,
        urls: Vec<String>,
    },
    Empty,
}

impl DiscoveryResult {
    pub fn urls(&self) -> &[String] {
        match self {
            Self::Found { urls, .. } => urls,
            Self::Empty => &[],
        }
    }

    fn from_urls(source: DiscoverySource, urls: Vec<String>) -> Option<Self> {
        if urls.is_empty() {
            None
        } else {
            Some(Self::Found { source, urls })
        }
    }
}

/// One request made while discovering seeds
#[derive(Debug)]
pub struct DiscoveryFetch {
    /// The URL that was requested
    pub url: Url,
    /// The step that made the request
    pub step: DiscoverySource,
    pub outcome: FetchOutcome,
}

impl DiscoveryFetch {
    /// A 2xx HTML page verified by a conventional-path check
    pub fn verified_page(&self) -> bool {
        self.step == DiscoverySource::ConventionalPaths
            && matches!(&self.outcome, FetchOutcome::Page(page) if (200..300).contains(&page.status))
    }
}

/// Seeds for a site plus the requests made to find them
///
/// A cache hit makes no requests, so `fetches` is empty.
#[derive(Debug)]
pub struct DiscoveryRun {
    pub result: DiscoveryResult,
    pub fetches: Vec<DiscoveryFetch>,
}

/// Process-wide discovery results keyed by normalized base URL
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    entries: Mutex<HashMap<String, DiscoveryResult>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<DiscoveryResult> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, result: DiscoveryResult) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, result);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs the discovery chain for one site
pub struct Discovery<'a> {
    pub client: &'a Client,
    pub profiles: &'a ProfilePool,
    pub gate: &'a RespectfulGate,
    pub breakers: &'a BreakerRegistry,
    pub browser: Option<&'a dyn BrowserService>,
    pub cache: &'a DiscoveryCache,
    pub config: &'a CrawlerConfig,
    /// Lowercase schedule keywords matched against robots.txt paths
    pub tokens: &'a [String],
}

impl<'a> Discovery<'a> {
    /// Seeds for `base`
    ///
    /// # Arguments
    ///
    /// * `base` - The site root
    /// * `site_domain` - Registrable domain seeds must belong to
    /// * `root_html` - The already-fetched homepage, if any
    ///
    /// # Returns
    ///
    /// The (possibly cached) seeds and every request made on a cache miss
    pub async fn run(&self, base: &Url, site_domain: &str, root_html: Option<&str>) -> DiscoveryRun {
        let key = normalize_base_url(base.as_str()).unwrap_or_else(|_| base.to_string());
        if let Some(cached) = self.cache.get(&key) {
            debug!(base = %key, "Discovery cache hit");
            return DiscoveryRun {
                result: cached,
                fetches: Vec::new(),
            };
        }

        let mut fetches = Vec::new();
        let result = self.discover(base, site_domain, root_html, &mut fetches).await;
        match &result {
            DiscoveryResult::Found { source, urls } => {
                info!(base = %key, source = source.as_str(), count = urls.len(), "Discovered seed URLs")
            }
            DiscoveryResult::Empty => info!(base = %key, "Discovery found no seed URLs"),
        }
        self.cache.insert(key, result.clone());
        DiscoveryRun { result, fetches }
    }

    async fn discover(
        &self,
        base: &Url,
        site_domain: &str,
        root_html: Option<&str>,
        log: &mut Vec<DiscoveryFetch>,
    ) -> DiscoveryResult {
        let robots = self.gate.robots_for(base).await;

        let sitemap_urls = self.from_sitemaps(base, site_domain, &robots, log).await;
        if let Some(found) = DiscoveryResult::from_urls(DiscoverySource::Sitemap, sitemap_urls) {
            return found;
        }

        let path_urls = self.from_paths(base, site_domain, log).await;
        if let Some(found) = DiscoveryResult::from_urls(DiscoverySource::ConventionalPaths, path_urls) {
            return found;
        }

        let mut nav = Seeds::new(site_domain);
        if let Some(html) = root_html {
            nav.extend(extract_nav_links(html, base));
        }
        let static_count = nav.len();
        if static_count < self.config.min_nav_links {
            if let Some(browser) = self.browser {
                nav.extend(self.from_browser_nav(browser, base, log).await);
            }
        }
        let source = if nav.len() > static_count {
            DiscoverySource::BrowserNav
        } else {
            DiscoverySource::StaticNav
        };
        if let Some(found) = DiscoveryResult::from_urls(source, nav.into_urls()) {
            return found;
        }

        let robots_urls = self.from_robots_rules(base, site_domain, &robots);
        DiscoveryResult::from_urls(DiscoverySource::RobotsRules, robots_urls)
            .unwrap_or(DiscoveryResult::Empty)
    }

    /// Page URLs from the first sitemap that lists any, following index
    /// files up to the configured fan-out
    async fn from_sitemaps(
        &self,
        base: &Url,
        site_domain: &str,
        robots: &ParsedRobots,
        log: &mut Vec<DiscoveryFetch>,
    ) -> Vec<String> {
        let mut roots: Vec<String> = robots.sitemaps();
        roots.extend(
            SITEMAP_PATHS
                .iter()
                .filter_map(|p| base.join(p).ok())
                .map(|u| u.to_string()),
        );
        let mut tried = HashSet::new();

        for root in roots {
            if !tried.insert(root.clone()) {
                continue;
            }
            let Some((pages, children)) = self.read_sitemap(&root, log).await else {
                continue;
            };

            let mut seeds = Seeds::new(site_domain);
            seeds.extend(pages);

            let mut queue: VecDeque<String> = children.into();
            let mut fanout = self.config.sitemap_fanout;
            while fanout > 0 {
                let Some(child) = queue.pop_front() else {
                    break;
                };
                if !tried.insert(child.clone()) {
                    continue;
                }
                fanout -= 1;
                if let Some((pages, grandchildren)) = self.read_sitemap(&child, log).await {
                    seeds.extend(pages);
                    queue.extend(grandchildren);
                }
            }

            if !seeds.is_empty() {
                debug!(sitemap = %root, count = seeds.len(), "Sitemap yielded URLs");
                return seeds.into_urls();
            }
        }

        Vec::new()
    }

    /// Fetches one sitemap; returns (page URLs, nested sitemap URLs)
    async fn read_sitemap(
        &self,
        sitemap_url: &str,
        log: &mut Vec<DiscoveryFetch>,
    ) -> Option<(Vec<String>, Vec<String>)> {
        let url = Url::parse(sitemap_url).ok()?;
        if self.gate.admit(&url).await == GateDecision::Disallowed {
            return None;
        }

        let breaker = self.breakers.get(OperationType::PageLoad);
        let outcome = fetch(self.client, self.profiles.draw(), &url, &breaker, Expect::Any).await;
        let entries = match &outcome {
            FetchOutcome::Page(page) if (200..300).contains(&page.status) => {
                Some(parse_sitemap(page.body.as_bytes()))
            }
            _ => None,
        };
        log.push(DiscoveryFetch {
            url,
            step: DiscoverySource::Sitemap,
            outcome,
        });
        entries
    }

    /// Conventional schedule paths that answer with a 2xx page
    async fn from_paths(&self, base: &Url, site_domain: &str, log: &mut Vec<DiscoveryFetch>) -> Vec<String> {
        let breaker = self.breakers.get(OperationType::UrlVerification);
        let mut seeds = Seeds::new(site_domain);

        for path in SCHEDULE_PATHS {
            let Ok(url) = base.join(path) else {
                continue;
            };
            if self.gate.admit(&url).await == GateDecision::Disallowed {
                continue;
            }

            let outcome = fetch(self.client, self.profiles.draw(), &url, &breaker, Expect::Html).await;
            let circuit_open = matches!(
                outcome,
                FetchOutcome::Network {
                    kind: NetworkErrorKind::CircuitOpen,
                    ..
                }
            );
            if let FetchOutcome::Page(page) = &outcome {
                if (200..300).contains(&page.status) {
                    seeds.push(page.url.as_str());
                }
            }
            log.push(DiscoveryFetch {
                url,
                step: DiscoverySource::ConventionalPaths,
                outcome,
            });
            if circuit_open {
                debug!(base = %base, "URL verification circuit open, stopping path checks");
                break;
            }
        }

        seeds.into_urls()
    }

    async fn from_browser_nav(
        &self,
        browser: &dyn BrowserService,
        base: &Url,
        log: &mut Vec<DiscoveryFetch>,
    ) -> Vec<String> {
        let breaker = self.breakers.get(OperationType::ScriptExecution);
        let outcome = fetch_rendered(browser, base, &breaker).await;
        let links = match &outcome {
            FetchOutcome::Page(page) => extract_nav_links(&page.body, &page.url),
            _ => Vec::new(),
        };
        log.push(DiscoveryFetch {
            url: base.clone(),
            step: DiscoverySource::BrowserNav,
            outcome,
        });
        links
    }

    /// robots.txt rule paths mentioning a schedule keyword
    fn from_robots_rules(&self, base: &Url, site_domain: &str, robots: &ParsedRobots) -> Vec<String> {
        let mut seeds = Seeds::new(site_domain);
        for rule in robots.rules() {
            let path = rule
                .path
                .split(['*', '$'])
                .next()
                .unwrap_or_default()
                .to_string();
            if path.len() <= 1 || !mentions_token(&path, self.tokens) {
                continue;
            }
            if let Ok(url) = base.join(&path) {
                seeds.push(url.as_str());
            }
        }
        seeds.into_urls()
    }
}

fn mentions_token(path: &str, tokens: &[String]) -> bool {
    let lower = path.to_lowercase();
    tokens.iter().any(|t| path_mentions(&lower, t))
}

/// Parses sitemap XML into (page URLs, nested sitemap URLs)
pub fn parse_sitemap(xml: &[u8]) -> (Vec<String>, Vec<String>) {
    let mut pages = Vec::new();
    let mut children = Vec::new();

    for entity in SiteMapReader::new(Cursor::new(xml)) {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    pages.push(url.to_string());
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    children.push(url.to_string());
                }
            }
            _ => {}
        }
    }

    (pages, children)
}

/// Normalized, filtered, de-duplicated seed URLs in discovery order
struct Seeds<'d> {
    site_domain: &'d str,
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl<'d> Seeds<'d> {
    fn new(site_domain: &'d str) -> Self {
        Self {
            site_domain,
            seen: HashSet::new(),
            urls: Vec::new(),
        }
    }

    fn push(&mut self, raw: &str) {
        let Ok(url) = normalize_url(raw) else {
            return;
        };
        if !is_crawlable_link(&url, self.site_domain) {
            return;
        }
        let url = url.to_string();
        if self.seen.insert(url.clone()) {
            self.urls.push(url);
        }
    }

    fn extend<I: IntoIterator<Item = String>>(&mut self, raw: I) {
        for url in raw {
            self.push(&url);
        }
    }

    fn len(&self) -> usize {
        self.urls.len()
    }

    fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PolitenessConfig, UserAgentConfig};
    use crate::url::registrable_domain;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        client: Client,
        profiles: ProfilePool,
        gate: RespectfulGate,
        breakers: BreakerRegistry,
        cache: DiscoveryCache,
        config: CrawlerConfig,
        tokens: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let politeness = PolitenessConfig {
                default_crawl_delay_secs: 0.0,
                max_jitter_secs: 0.0,
                https_only: false,
                ..Default::default()
            };
            let client = Client::new();
            Self {
                gate: RespectfulGate::new(client.clone(), &politeness, "ScheduleScout"),
                profiles: ProfilePool::new(&UserAgentConfig {
                    crawler_name: "ScheduleScout".to_string(),
                    crawler_version: "1.0".to_string(),
                    contact_url: "https://example.com/about".to_string(),
                    contact_email: "admin@example.com".to_string(),
                    rotation: vec![],
                }),
                breakers: BreakerRegistry::new(Default::default()),
                cache: DiscoveryCache::new(),
                config: CrawlerConfig::default(),
                tokens: vec!["confession".to_string(), "mass times".to_string()],
                client,
            }
        }

        fn discovery(&self) -> Discovery<'_> {
            Discovery {
                client: &self.client,
                profiles: &self.profiles,
                gate: &self.gate,
                breakers: &self.breakers,
                browser: None,
                cache: &self.cache,
                config: &self.config,
                tokens: &self.tokens,
            }
        }
    }

    fn urlset(locs: &[String]) -> String {
        let entries: String = locs
            .iter()
            .map(|l| format!("<url><loc>{}</loc></url>", l))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
            entries
        )
    }

    fn site(server: &MockServer) -> (Url, String) {
        let base = Url::parse(&server.uri()).unwrap();
        let domain = registrable_domain(base.host_str().unwrap());
        (base, domain)
    }

    #[test]
    fn test_parse_sitemap_index_and_urlset() {
        let index = r#"<?xml version="1.0"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sitemap><loc>https://stmary.org/page-sitemap.xml</loc></sitemap>
        </sitemapindex>"#;
        let (pages, children) = parse_sitemap(index.as_bytes());
        assert!(pages.is_empty());
        assert_eq!(children, vec!["https://stmary.org/page-sitemap.xml".to_string()]);

        let set = urlset(&["https://stmary.org/confession-times".to_string()]);
        let (pages, children) = parse_sitemap(set.as_bytes());
        assert_eq!(pages, vec!["https://stmary.org/confession-times".to_string()]);
        assert!(children.is_empty());
    }

    #[test]
    fn test_mentions_token_accepts_hyphenated_phrases() {
        let tokens = vec!["mass times".to_string()];
        assert!(mentions_token("/Mass-Times/", &tokens));
        assert!(!mentions_token("/wp-admin/", &tokens));
    }

    #[tokio::test]
    async fn test_sitemap_is_first_source_and_cached() {
        let server = MockServer::start().await;
        let body = urlset(&[
            format!("{}/confession-times", server.uri()),
            format!("{}/logo.png", server.uri()),
            "https://elsewhere.org/confession".to_string(),
        ]);
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/xml"))
            .expect(1)
            .mount(&server)
            .await;

        let fixture = Fixture::new();
        let (base, domain) = site(&server);
        let run = fixture.discovery().run(&base, &domain, None).await;
        assert_eq!(run.fetches.len(), 1);
        assert_eq!(run.fetches[0].step, DiscoverySource::Sitemap);
        let result = run.result;
        assert_eq!(
            result,
            DiscoveryResult::Found {
                source: DiscoverySource::Sitemap,
                urls: vec![format!("{}/confession-times", server.uri())],
            }
        );

        let again = fixture.discovery().run(&base, &domain, None).await;
        assert_eq!(again.result, result);
        assert!(again.fetches.is_empty());
        assert_eq!(fixture.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_sitemap_index_fanout_is_capped() {
        let server = MockServer::start().await;
        let index = format!(
            r#"<?xml version="1.0"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <sitemap><loc>{0}/one.xml</loc></sitemap>
                <sitemap><loc>{0}/two.xml</loc></sitemap>
            </sitemapindex>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(index, "application/xml"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/one.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                urlset(&[format!("{}/mass-times", server.uri())]),
                "application/xml",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/two.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                urlset(&[format!("{}/adoration", server.uri())]),
                "application/xml",
            ))
            .expect(0)
            .mount(&server)
            .await;

        let mut fixture = Fixture::new();
        fixture.config.sitemap_fanout = 1;
        let (base, domain) = site(&server);
        let run = fixture.discovery().run(&base, &domain, None).await;
        assert_eq!(run.result.urls(), &[format!("{}/mass-times", server.uri())]);
        let read: Vec<&str> = run.fetches.iter().map(|f| f.url.path()).collect();
        assert_eq!(read, vec!["/sitemap.xml", "/one.xml"]);
    }

    #[tokio::test]
    async fn test_conventional_paths_when_no_sitemap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mass-times"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<p>Mass Sunday 9am</p>", "text/html"),
            )
            .mount(&server)
            .await;

        let fixture = Fixture::new();
        let (base, domain) = site(&server);
        let run = fixture.discovery().run(&base, &domain, None).await;
        assert_eq!(
            run.result,
            DiscoveryResult::Found {
                source: DiscoverySource::ConventionalPaths,
                urls: vec![format!("{}/mass-times", server.uri())],
            }
        );

        // Every sitemap location and every schedule path was requested once
        assert_eq!(run.fetches.len(), SITEMAP_PATHS.len() + SCHEDULE_PATHS.len());
        let verified: Vec<&DiscoveryFetch> = run.fetches.iter().filter(|f| f.verified_page()).collect();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].url.path(), "/mass-times");
        match &verified[0].outcome {
            FetchOutcome::Page(page) => assert!(page.body.contains("Sunday 9am")),
            other => panic!("expected a page, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_static_nav_links() {
        let server = MockServer::start().await;
        let fixture = Fixture::new();
        let (base, domain) = site(&server);

        let root = r#"<html><body><nav><a href="/confession">Confession</a></nav></body></html>"#;
        let result = fixture.discovery().run(&base, &domain, Some(root)).await.result;
        assert_eq!(
            result,
            DiscoveryResult::Found {
                source: DiscoverySource::StaticNav,
                urls: vec![format!("{}/confession", server.uri())],
            }
        );
    }

    #[tokio::test]
    async fn test_robots_rules_are_last_resort() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "User-agent: *\nAllow: /confession-schedule*\nDisallow: /wp-admin/\n",
            ))
            .mount(&server)
            .await;

        let fixture = Fixture::new();
        let (base, domain) = site(&server);
        let result = fixture.discovery().run(&base, &domain, None).await.result;
        assert_eq!(
            result,
            DiscoveryResult::Found {
                source: DiscoverySource::RobotsRules,
                urls: vec![format!("{}/confession-schedule", server.uri())],
            }
        );
    }

    #[tokio::test]
    async fn test_nothing_anywhere_is_empty() {
        let server = MockServer::start().await;
        let fixture = Fixture::new();
        let (base, domain) = site(&server);
        assert_eq!(
            fixture.discovery().run(&base, &domain, None).await.result,
            DiscoveryResult::Empty
        );
    }
}
