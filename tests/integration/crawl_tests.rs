//! Integration tests for site sessions
//!
//! These tests use wiremock to create mock parish sites and drive whole
//! sessions over HTTP, checking what reaches the network and the store.

use schedule_scout::config::{Config, OutputConfig, PolitenessConfig, SiteEntry, UserAgentConfig};
use schedule_scout::crawler::{run_crawl, run_session, CrawlerContext, SiteSelection};
use schedule_scout::events::{ChannelSink, LifecycleEvent, TracingSink};
use schedule_scout::extraction::{ExtractionMethod, ScheduleType};
use schedule_scout::frontier::{KeywordSet, Prioritizer};
use schedule_scout::gate::BlockingType;
use schedule_scout::storage::{lock_storage, share, RunStatus, SiteRecord, SqliteStorage, Storage};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with no politeness delay
fn create_test_config(db_path: &str) -> Config {
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
            database_path: db_path.to_string(),
            summary_path: "./test_summary.md".to_string(),
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

fn site_for(server: &MockServer) -> SiteRecord {
    SiteRecord {
        id: 1,
        name: "St. Anne".to_string(),
        base_url: format!("{}/", server.uri()),
        group: Some("test".to_string()),
    }
}

async fn mount_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
        .mount(server)
        .await;
}

async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test]
async fn test_sitemap_seed_is_chosen_for_extraction() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    mount_html(
        &server,
        "/",
        "<html><head><title>St. Anne</title></head><body><p>Welcome, friends.</p></body></html>",
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{}/confession-times</loc></url>
</urlset>"#,
                base_url
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/confession-times",
        r#"<html><body><main>
            <h2>Confession</h2>
            <p>Saturdays 3:00 - 4:00 PM</p>
        </main></body></html>"#,
    )
    .await;

    let storage = share(SqliteStorage::new_in_memory().unwrap());
    let (sink, mut events) = ChannelSink::new();
    let ctx = CrawlerContext::with_client(
        create_test_config(":memory:"),
        reqwest::Client::new(),
        KeywordSet::fallback(),
        storage.clone(),
    )
    .with_events(Arc::new(sink));

    let report = run_session(&ctx, site_for(&server), CancellationToken::new())
        .await
        .unwrap();

    // The sitemap page is the only reconciliation candidate, and the one chosen
    let candidate = Url::parse(&format!("{}/confession-times", base_url)).unwrap();
    let prioritizer = Prioritizer::new(
        Arc::clone(&ctx.keywords),
        Default::default(),
        &Url::parse(&base_url).unwrap(),
        ScheduleType::all(),
    );
    assert_eq!(
        prioritizer.choose_best_url(&[candidate.clone()], ScheduleType::Reconciliation),
        Some(candidate.clone())
    );

    let reconciliation = report
        .results
        .iter()
        .find(|r| r.schedule_type == ScheduleType::Reconciliation)
        .unwrap();
    assert_eq!(reconciliation.method, ExtractionMethod::Keyword);
    assert_eq!(reconciliation.source_url.as_deref(), Some(candidate.as_str()));
    assert!(reconciliation.schedule_text.contains("3:00 - 4:00 PM"));

    for other in [ScheduleType::Adoration, ScheduleType::Mass] {
        let result = report.results.iter().find(|r| r.schedule_type == other).unwrap();
        assert!(!result.found());
        assert_eq!(result.schedule_text, "Information not found");
    }

    let stored = lock_storage(&storage).unwrap();
    let visits = stored.visits_for_site(1).unwrap();
    assert!(visits.iter().any(|v| v.url == candidate.as_str() && v.schedule_data_found));
    let candidates = stored.candidates_for_site(1).unwrap();
    assert!(candidates.iter().any(|c| c.url == candidate.as_str() && c.visited));
    drop(stored);

    let mut saved_facts = 0;
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::FactSaved { schedule_type, .. } = event {
            assert_eq!(schedule_type, ScheduleType::Reconciliation);
            saved_facts += 1;
        }
    }
    assert_eq!(saved_facts, 1);
}

#[tokio::test]
async fn test_forbidden_root_blocks_site() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(403).set_body_raw("<h1>Forbidden</h1>", "text/html"))
        .mount(&server)
        .await;
    mount_html(&server, "/confession", "<p>Confession Saturday 3pm</p>").await;

    let storage = share(SqliteStorage::new_in_memory().unwrap());
    let ctx = CrawlerContext::with_client(
        create_test_config(":memory:"),
        reqwest::Client::new(),
        KeywordSet::fallback(),
        storage.clone(),
    );

    let report = run_session(&ctx, site_for(&server), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.blocked, Some(BlockingType::Forbidden403));

    // robots.txt and the root, nothing else
    let paths = requested_paths(&server).await;
    assert!(paths.iter().all(|p| p == "/" || p == "/robots.txt"), "{:?}", paths);
    assert_eq!(paths.iter().filter(|p| p.as_str() == "/").count(), 1);

    let stored = lock_storage(&storage).unwrap();
    let assessment = stored.get_blocking_assessment(1).unwrap().unwrap();
    assert!(assessment.is_blocked);
    assert_eq!(assessment.blocking_type, Some(BlockingType::Forbidden403));
    assert_eq!(assessment.status_code, Some(403));
    assert_eq!(stored.visits_for_site(1).unwrap().len(), 1);
}

#[tokio::test]
async fn test_robots_disallowed_urls_are_never_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("User-agent: *\nDisallow: /private\n", "text/plain"),
        )
        .mount(&server)
        .await;
    mount_html(
        &server,
        "/",
        r#"<html><body>
            <a href="/private/confession-schedule">Confession</a>
            <a href="/bulletin">Bulletin</a>
        </body></html>"#,
    )
    .await;
    mount_html(&server, "/bulletin", "<p>Parish news</p>").await;

    let storage = share(SqliteStorage::new_in_memory().unwrap());
    let ctx = CrawlerContext::with_client(
        create_test_config(":memory:"),
        reqwest::Client::new(),
        KeywordSet::fallback(),
        storage.clone(),
    );

    let report = run_session(&ctx, site_for(&server), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.blocked, None);

    let paths = requested_paths(&server).await;
    assert!(!paths.iter().any(|p| p.starts_with("/private")), "{:?}", paths);
    assert!(paths.iter().any(|p| p == "/bulletin"));

    let visits = lock_storage(&storage).unwrap().visits_for_site(1).unwrap();
    let disallowed = visits
        .iter()
        .find(|v| v.url.ends_with("/private/confession-schedule"))
        .unwrap();
    assert_eq!(disallowed.error_type.as_deref(), Some("robots_disallowed"));
    assert_eq!(disallowed.http_status, None);
}

#[tokio::test]
async fn test_robots_disallowed_root_halts_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("User-agent: *\nDisallow: /\n", "text/plain"))
        .mount(&server)
        .await;

    let storage = share(SqliteStorage::new_in_memory().unwrap());
    let ctx = CrawlerContext::with_client(
        create_test_config(":memory:"),
        reqwest::Client::new(),
        KeywordSet::fallback(),
        storage.clone(),
    );

    let report = run_session(&ctx, site_for(&server), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.blocked, Some(BlockingType::RobotsDisallowed));
    assert_eq!(report.pages_visited, 0);
    assert_eq!(requested_paths(&server).await, vec!["/robots.txt".to_string()]);

    let assessment = lock_storage(&storage)
        .unwrap()
        .get_blocking_assessment(1)
        .unwrap()
        .unwrap();
    assert_eq!(assessment.blocking_type, Some(BlockingType::RobotsDisallowed));
}

#[tokio::test]
async fn test_full_run_persists_results() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/",
        r#"<html><body>
            <a href="/mass-times">Mass Times</a>
        </body></html>"#,
    )
    .await;
    mount_html(
        &server,
        "/mass-times",
        "<html><body><h2>Mass Times</h2><p>Sunday Mass 8:00 AM and 10:30 AM</p></body></html>",
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("scout.db");
    let mut config = create_test_config(&db.to_string_lossy());
    config.sites = vec![SiteEntry {
        id: 3,
        name: "St. Joseph".to_string(),
        url: format!("{}/", server.uri()),
        group: Some("east".to_string()),
    }];

    let selection = SiteSelection {
        group: Some("east".to_string()),
        ..Default::default()
    };
    let summary = run_crawl(config, "hash", &selection, Arc::new(TracingSink))
        .await
        .unwrap();
    assert_eq!(summary.sites, 1);
    assert_eq!(summary.completed, 1);
    assert!(summary.facts_found >= 1);

    let storage = SqliteStorage::new(&db).unwrap();
    assert_eq!(storage.get_latest_run().unwrap().unwrap().status, RunStatus::Completed);
    let mass = storage.get_extraction(3, ScheduleType::Mass).unwrap().unwrap();
    assert!(mass.found());
    assert!(mass.source_url.is_some());
}
