//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client
//! - Drawing an immutable request profile per request
//! - Breaker-guarded GET requests with per-attempt timeouts
//! - Content-Type checks and error classification
//! - The headless-browser fallback fetch

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::config::{PolitenessConfig, UserAgentConfig};
use crate::crawler::browser::{BrowserError, BrowserService};
use reqwest::header::{HeaderMap, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.8", "en;q=0.7"];

/// Headers sent with one request
///
/// Profiles are drawn from a [`ProfilePool`] per request and never mutated,
/// so concurrent workers cannot see each other's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProfile {
    pub user_agent: String,
    pub accept_language: &'static str,
}

/// Small rotation pool of request profiles
#[derive(Debug, Clone)]
pub struct ProfilePool {
    profiles: Vec<RequestProfile>,
}

impl ProfilePool {
    /// The crawler's own identity first, then any configured rotation agents
    pub fn new(config: &UserAgentConfig) -> Self {
        let agents = std::iter::once(config.identity()).chain(config.rotation.iter().cloned());
        let profiles = agents
            .enumerate()
            .map(|(i, user_agent)| RequestProfile {
                user_agent,
                accept_language: ACCEPT_LANGUAGES[i % ACCEPT_LANGUAGES.len()],
            })
            .collect();
        Self { profiles }
    }

    pub fn draw(&self) -> &RequestProfile {
        &self.profiles[fastrand::usize(..self.profiles.len())]
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Builds the HTTP client shared by every worker
///
/// No overall timeout is set; each attempt is bounded by the guarding
/// breaker's request timeout instead.
///
/// # Arguments
///
/// * `user_agent` - Supplies the default `User-Agent` identity
/// * `politeness` - Supplies the HTTPS-only switch
///
/// # Returns
///
/// * `Ok(Client)` - A client with compression and a 10-hop redirect limit
/// * `Err(reqwest::Error)` - The TLS backend could not be initialized
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    politeness: &PolitenessConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.identity())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .https_only(politeness.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// What kind of body the caller can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// HTML pages; anything else is a content mismatch
    Html,
    /// Any textual body (sitemaps, robots files)
    Any,
}

/// Why a guarded attempt failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("server error: HTTP {0}")]
    ServerError(u16),
}

/// Coarse classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    ServerError,
    CircuitOpen,
    Browser,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::ServerError => "server_error",
            Self::CircuitOpen => "circuit_open",
            Self::Browser => "browser",
            Self::Other => "network",
        }
    }
}

/// A successfully downloaded document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub body: String,
    pub elapsed: Duration,
}

/// Result of a fetch
#[derive(Debug)]
pub enum FetchOutcome {
    Page(FetchedPage),
    /// The response is not a document the caller can use; its body was not read
    ContentMismatch {
        url: Url,
        status: u16,
        content_type: String,
        elapsed: Duration,
    },
    /// No response could be obtained
    Network {
        kind: NetworkErrorKind,
        message: String,
        elapsed: Duration,
    },
}

enum Attempt {
    Body {
        url: Url,
        status: u16,
        headers: HeaderMap,
        content_type: Option<String>,
        body: String,
    },
    Mismatch {
        url: Url,
        status: u16,
        content_type: String,
    },
}

fn is_usable(content_type: Option<&str>, expect: Expect) -> bool {
    let Some(ct) = content_type else {
        return true;
    };
    let ct = ct.to_ascii_lowercase();
    match expect {
        Expect::Html => ct.contains("text/html") || ct.contains("application/xhtml"),
        Expect::Any => ct.starts_with("text/") || ct.contains("xml") || ct.contains("json"),
    }
}

async fn fetch_once(
    client: &Client,
    profile: &RequestProfile,
    url: &Url,
    expect: Expect,
) -> Result<Attempt, FetchError> {
    let response = client
        .get(url.clone())
        .header(USER_AGENT, profile.user_agent.as_str())
        .header(ACCEPT_LANGUAGE, profile.accept_language)
        .header(ACCEPT, ACCEPT_HTML)
        .send()
        .await?;

    let status = response.status();
    // 503 is kept as a response so blocking detection can see it
    if status.is_server_error() && status.as_u16() != 503 {
        return Err(FetchError::ServerError(status.as_u16()));
    }

    let final_url = response.url().clone();
    let headers = response.headers().clone();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if status.is_success() && !is_usable(content_type.as_deref(), expect) {
        return Ok(Attempt::Mismatch {
            url: final_url,
            status: status.as_u16(),
            content_type: content_type.unwrap_or_default(),
        });
    }

    let body = response.text().await?;
    Ok(Attempt::Body {
        url: final_url,
        status: status.as_u16(),
        headers,
        content_type,
        body,
    })
}

fn classify(error: &BreakerError<FetchError>) -> NetworkErrorKind {
    match error {
        BreakerError::Open(_) => NetworkErrorKind::CircuitOpen,
        BreakerError::Timeout { .. } => NetworkErrorKind::Timeout,
        BreakerError::Failed(FetchError::ServerError(_)) => NetworkErrorKind::ServerError,
        BreakerError::Failed(FetchError::Request(e)) if e.is_timeout() => NetworkErrorKind::Timeout,
        BreakerError::Failed(FetchError::Request(e)) if e.is_connect() => NetworkErrorKind::Connect,
        BreakerError::Failed(FetchError::Request(_)) => NetworkErrorKind::Other,
    }
}

/// Fetches a URL under a circuit breaker
///
/// Non-2xx responses other than 5xx come back as pages so the caller can
/// assess them for blocking. 5xx responses (except 503), timeouts and
/// transport errors count as breaker failures and are retried.
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `profile` - Headers for this request
/// * `url` - The URL to fetch
/// * `breaker` - The breaker guarding this operation type
/// * `expect` - Which content types the caller can use
///
/// # Returns
///
/// * `FetchOutcome::Page` - A response whose body was read
/// * `FetchOutcome::ContentMismatch` - A 2xx response of an unusable type
/// * `FetchOutcome::Network` - No usable response, with its error kind
pub async fn fetch(
    client: &Client,
    profile: &RequestProfile,
    url: &Url,
    breaker: &CircuitBreaker,
    expect: Expect,
) -> FetchOutcome {
    let started = Instant::now();
    let result = breaker
        .call(|| fetch_once(client, profile, url, expect))
        .await;
    let elapsed = started.elapsed();

    match result {
        Ok(Attempt::Body {
            url,
            status,
            headers,
            content_type,
            body,
        }) => FetchOutcome::Page(FetchedPage {
            url,
            status,
            headers,
            content_type,
            body,
            elapsed,
        }),
        Ok(Attempt::Mismatch {
            url,
            status,
            content_type,
        }) => FetchOutcome::ContentMismatch {
            url,
            status,
            content_type,
            elapsed,
        },
        Err(error) => {
            let kind = classify(&error);
            tracing::debug!(url = %url, kind = kind.as_str(), error = %error, "Fetch failed");
            FetchOutcome::Network {
                kind,
                message: error.to_string(),
                elapsed,
            }
        }
    }
}

/// Fetches a URL through the headless browser under a circuit breaker
pub async fn fetch_rendered(
    browser: &dyn BrowserService,
    url: &Url,
    breaker: &CircuitBreaker,
) -> FetchOutcome {
    let started = Instant::now();
    let result = breaker.call(|| browser.render(url)).await;
    let elapsed = started.elapsed();

    match result {
        Ok(rendered) => {
            let final_url = Url::parse(&rendered.url).unwrap_or_else(|_| url.clone());
            FetchOutcome::Page(FetchedPage {
                url: final_url,
                status: rendered.status.unwrap_or(200),
                headers: HeaderMap::new(),
                content_type: Some("text/html".to_string()),
                body: rendered.html,
                elapsed,
            })
        }
        Err(error) => {
            let kind = match &error {
                BreakerError::Open(_) => NetworkErrorKind::CircuitOpen,
                BreakerError::Timeout { .. } | BreakerError::Failed(BrowserError::Timeout { .. }) => {
                    NetworkErrorKind::Timeout
                }
                BreakerError::Failed(_) => NetworkErrorKind::Browser,
            };
            FetchOutcome::Network {
                kind,
                message: error.to_string(),
                elapsed,
            }
        }
    }
}
