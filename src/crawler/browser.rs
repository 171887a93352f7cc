//! Headless-browser rendering service
//!
//! Used for JavaScript-built navigation and as a fallback fetch once a site
//! keeps answering ordinary requests with bot-protection pages.

use crate::config::BrowserConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors from the rendering service
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Render request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Render service returned HTTP {0}")]
    Status(u16),

    #[error("Render of {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("Invalid render endpoint: {0}")]
    Endpoint(String),
}

/// A page as rendered by the browser
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderedPage {
    /// Final URL after client-side redirects
    pub url: String,
    #[serde(default)]
    pub status: Option<u16>,
    pub html: String,
}

/// Renders pages in a real browser
#[async_trait]
pub trait BrowserService: Send + Sync {
    async fn render(&self, url: &Url) -> Result<RenderedPage, BrowserError>;
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
}

/// Client for a render service accepting `POST {"url", "timeout_ms"}` and
/// answering `{"url", "status", "html"}`
#[derive(Clone)]
pub struct HttpRenderService {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpRenderService {
    pub fn new(client: Client, config: &BrowserConfig) -> Result<Self, BrowserError> {
        let endpoint =
            Url::parse(&config.endpoint).map_err(|e| BrowserError::Endpoint(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl BrowserService for HttpRenderService {
    async fn render(&self, url: &Url) -> Result<RenderedPage, BrowserError> {
        let request = RenderRequest {
            url: url.as_str(),
            timeout_ms: self.timeout.as_millis() as u64,
        };

        let call = async {
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(BrowserError::Status(response.status().as_u16()));
            }

            Ok(response.json::<RenderedPage>().await?)
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }),
        }
    }
}
