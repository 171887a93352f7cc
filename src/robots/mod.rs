//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::{ParsedRobots, RobotsRule};

use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Fetches robots.txt for the origin of `url`
///
/// A missing file, a non-success status, a network failure, or a response
/// that does not finish within `timeout` all yield a permissive
/// [`ParsedRobots::allow_all`]; robots.txt problems never block a crawl on
/// their own.
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `url` - Any URL on the origin
/// * `timeout` - Bound on the whole request, body included
///
/// # Returns
///
/// The parsed rules, or allow-all
pub async fn fetch_robots(client: &Client, url: &Url, timeout: Duration) -> ParsedRobots {
    let robots_url = match url.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return ParsedRobots::allow_all(),
    };

    match client.get(robots_url.as_str()).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => ParsedRobots::from_content(&body),
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "Failed to read robots.txt body");
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!(
                url = %robots_url,
                status = response.status().as_u16(),
                "No robots.txt, allowing all"
            );
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::debug!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing all");
            ParsedRobots::allow_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_rules_are_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/mass", server.uri())).unwrap();
        let robots = fetch_robots(&Client::new(), &url, Duration::from_secs(5)).await;
        assert!(!robots.is_allowed(&format!("{}/private/x", server.uri()), "ScheduleScout"));
        assert!(robots.is_allowed(url.as_str(), "ScheduleScout"));
    }

    #[tokio::test]
    async fn test_stalled_server_allows_all_after_timeout() {
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

        let url = Url::parse(&server.uri()).unwrap();
        let robots = tokio::time::timeout(
            Duration::from_secs(5),
            fetch_robots(&Client::new(), &url, Duration::from_millis(200)),
        )
        .await
        .expect("robots.txt fetch must give up on its own");
        assert!(robots.is_allowed(&format!("{}/mass", server.uri()), "ScheduleScout"));
    }

    #[tokio::test]
    async fn test_missing_file_allows_all() {
        let server = MockServer::start().await;
        let url = Url::parse(&server.uri()).unwrap();
        let robots = fetch_robots(&Client::new(), &url, Duration::from_secs(5)).await;
        assert!(robots.is_allowed(&format!("{}/anything", server.uri()), "ScheduleScout"));
    }
}
