//! Respectful automation gate
//!
//! Every outbound page fetch passes through [`RespectfulGate::admit`] first:
//! robots.txt is resolved (fetched once per origin, then cached), a disallowed URL is
//! refused without touching the network, and an allowed one waits out the
//! per-origin delay. After the fetch, [`assess_response`] classifies any
//! blocking signals.

mod blocking;
mod rate_limit;

pub use blocking::{assess_response, BlockingAssessment, BlockingType, RobotsDecision};
pub use rate_limit::{OriginState, RateLimiter};

use crate::breaker::{BreakerConfig, OperationType};
use crate::config::PolitenessConfig;
use crate::robots::{fetch_robots, ParsedRobots, RobotsCache};
use crate::url::origin_key;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Result of asking the gate for permission to fetch a URL
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// The fetch may proceed; the caller already waited `waited`
    Allowed { waited: Duration },
    /// robots.txt forbids the URL for our agent
    Disallowed,
}

/// robots.txt + rate limiting shared by all workers
pub struct RespectfulGate {
    client: Client,
    robots: RobotsCache,
    /// One lock per origin so concurrent misses share a single fetch
    robots_fetches: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    robots_timeout: Duration,
    limiter: RateLimiter,
    agent_token: String,
}

impl RespectfulGate {
    /// Creates a gate
    ///
    /// `agent_token` is the product token matched against robots.txt groups.
    /// robots.txt requests are bounded by the URL-verification preset's
    /// request timeout until [`RespectfulGate::with_robots_timeout`] says otherwise.
    pub fn new(client: Client, config: &PolitenessConfig, agent_token: &str) -> Self {
        Self {
            client,
            robots: RobotsCache::new(config.robots_ttl_hours),
            robots_fetches: Mutex::new(HashMap::new()),
            robots_timeout: BreakerConfig::for_operation(OperationType::UrlVerification)
                .request_timeout,
            limiter: RateLimiter::new(
                Duration::from_secs_f64(config.default_crawl_delay_secs),
                Duration::from_secs_f64(config.max_jitter_secs),
            ),
            agent_token: agent_token.to_string(),
        }
    }

    pub fn with_robots_timeout(mut self, timeout: Duration) -> Self {
        self.robots_timeout = timeout;
        self
    }

    pub fn agent_token(&self) -> &str {
        &self.agent_token
    }

    pub fn robots_cache(&self) -> &RobotsCache {
        &self.robots
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn robots_fetch_lock(&self, origin: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut fetches = self.robots_fetches.lock().unwrap_or_else(|e| e.into_inner());
        fetches
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Returns robots.txt for the URL's origin, fetching it on a cache miss
    ///
    /// Concurrent misses for one origin wait for a single fetch.
    pub async fn robots_for(&self, url: &Url) -> ParsedRobots {
        let origin = origin_key(url);
        if let Some(robots) = self.robots.get(&origin) {
            return robots;
        }

        let lock = self.robots_fetch_lock(&origin);
        let _fetching = lock.lock().await;
        if let Some(robots) = self.robots.get(&origin) {
            return robots;
        }

        tracing::debug!(origin = %origin, "Fetching robots.txt");
        let robots = fetch_robots(&self.client, url, self.robots_timeout).await;
        self.robots.insert(&origin, robots.clone());
        robots
    }

    /// Checks robots.txt and, when allowed, waits for this origin's turn
    pub async fn admit(&self, url: &Url) -> GateDecision {
        let robots = self.robots_for(url).await;

        if !robots.is_allowed(url.as_str(), &self.agent_token) {
            tracing::info!(url = %url, "Disallowed by robots.txt");
            return GateDecision::Disallowed;
        }

        let crawl_delay = robots.crawl_delay(&self.agent_token);
        let waited = self
            .limiter
            .wait_turn(&origin_key(url), crawl_delay)
            .await;
        GateDecision::Allowed { waited }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_gate() -> RespectfulGate {
        let config = PolitenessConfig {
            default_crawl_delay_secs: 0.0,
            max_jitter_secs: 0.0,
            ..Default::default()
        };
        RespectfulGate::new(Client::new(), &config, "ScheduleScout")
    }

    #[tokio::test]
    async fn test_disallowed_url_never_waits() {
        let gate = test_gate();
        gate.robots_cache().insert(
            "https://stmary.org",
            ParsedRobots::from_content("User-agent: *\nDisallow: /private"),
        );

        let url = Url::parse("https://stmary.org/private/x").unwrap();
        assert_eq!(gate.admit(&url).await, GateDecision::Disallowed);
        assert_eq!(gate.limiter().request_count("https://stmary.org"), 0);
    }

    #[tokio::test]
    async fn test_allowed_url_records_request() {
        let gate = test_gate();
        gate.robots_cache()
            .insert("https://stmary.org", ParsedRobots::allow_all());

        let url = Url::parse("https://stmary.org/mass-times").unwrap();
        assert!(matches!(
            gate.admit(&url).await,
            GateDecision::Allowed { .. }
        ));
        assert_eq!(gate.limiter().request_count("https://stmary.org"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_robots_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private\n")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gate = test_gate();
        let mass = Url::parse(&format!("{}/mass", server.uri())).unwrap();
        let private = Url::parse(&format!("{}/private/x", server.uri())).unwrap();
        let (first, second) = tokio::join!(gate.admit(&mass), gate.admit(&private));

        assert!(matches!(first, GateDecision::Allowed { .. }));
        assert_eq!(second, GateDecision::Disallowed);
        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_robots_does_not_stall_admission() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /\n")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let gate = test_gate().with_robots_timeout(Duration::from_millis(200));
        let url = Url::parse(&format!("{}/mass", server.uri())).unwrap();
        let decision = tokio::time::timeout(Duration::from_secs(5), gate.admit(&url))
            .await
            .expect("admission must not wait on a stalled robots.txt");
        assert!(matches!(decision, GateDecision::Allowed { .. }));
    }
}
