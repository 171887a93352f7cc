//! Shared crawl dependencies
//!
//! Everything workers share lives in one [`CrawlerContext`], built once per
//! run and handed to sessions behind an `Arc`. Tests assemble their own.

use crate::breaker::{BreakerRegistry, OperationType};
use crate::config::{BreakerScope, Config};
use crate::crawler::browser::{BrowserService, HttpRenderService};
use crate::crawler::fetcher::{build_http_client, ProfilePool};
use crate::events::{EventSink, TracingSink};
use crate::extraction::{AiBackend, OpenAiBackend};
use crate::frontier::{DiscoveryCache, KeywordSet};
use crate::gate::RespectfulGate;
use crate::storage::SharedStorage;
use crate::ScoutError;
use reqwest::Client;
use std::sync::Arc;

/// Dependencies shared by every site session of a run
pub struct CrawlerContext {
    pub config: Arc<Config>,
    pub client: Client,
    pub profiles: ProfilePool,
    pub gate: RespectfulGate,
    pub discovery_cache: DiscoveryCache,
    pub breakers: Arc<BreakerRegistry>,
    pub keywords: Arc<KeywordSet>,
    pub ai: Option<Arc<dyn AiBackend>>,
    pub browser: Option<Arc<dyn BrowserService>>,
    pub events: Arc<dyn EventSink>,
    pub storage: SharedStorage,
}

impl CrawlerContext {
    /// Builds the context from configuration
    ///
    /// The AI backend is enabled only when `[ai]` is configured and its key
    /// is present in the environment; a missing key disables it with a
    /// warning rather than failing the run.
    pub fn new(
        config: Config,
        keywords: KeywordSet,
        storage: SharedStorage,
    ) -> Result<Self, ScoutError> {
        let client = build_http_client(&config.user_agent, &config.politeness)?;

        let ai: Option<Arc<dyn AiBackend>> = match &config.ai {
            Some(ai_config) => match OpenAiBackend::from_env(client.clone(), ai_config) {
                Ok(backend) => {
                    tracing::info!(model = backend.model(), "AI extraction enabled");
                    Some(Arc::new(backend))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "AI extraction disabled");
                    None
                }
            },
            None => None,
        };

        let browser: Option<Arc<dyn BrowserService>> = match &config.browser {
            Some(browser_config) => match HttpRenderService::new(client.clone(), browser_config) {
                Ok(service) => Some(Arc::new(service)),
                Err(e) => {
                    tracing::warn!(error = %e, "Browser service disabled");
                    None
                }
            },
            None => None,
        };

        let mut context = Self::with_client(config, client, keywords, storage);
        context.ai = ai;
        context.browser = browser;
        Ok(context)
    }

    /// A context around an existing client, with no AI or browser service
    pub fn with_client(
        config: Config,
        client: Client,
        keywords: KeywordSet,
        storage: SharedStorage,
    ) -> Self {
        let breakers = BreakerRegistry::new(config.breakers.clone());
        let gate = RespectfulGate::new(
            client.clone(),
            &config.politeness,
            &config.user_agent.crawler_name,
        )
        .with_robots_timeout(breakers.config_for(OperationType::UrlVerification).request_timeout);
        Self {
            profiles: ProfilePool::new(&config.user_agent),
            breakers: Arc::new(breakers),
            discovery_cache: DiscoveryCache::new(),
            keywords: Arc::new(keywords),
            ai: None,
            browser: None,
            events: Arc::new(TracingSink),
            config: Arc::new(config),
            client,
            gate,
            storage,
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiBackend>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserService>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Breakers for one session: the shared registry, or fresh counters
    /// when breakers are scoped per site
    pub fn session_breakers(&self) -> Arc<BreakerRegistry> {
        match self.config.crawler.breaker_scope {
            BreakerScope::Process => Arc::clone(&self.breakers),
            BreakerScope::Site => Arc::new(self.breakers.fresh()),
        }
    }
}
