use crate::extraction::ScheduleType;
use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure for Schedule Scout
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub ai: Option<AiConfig>,
    #[serde(default)]
    pub browser: Option<BrowserConfig>,
    /// Per-operation circuit breaker overrides, keyed by operation name
    /// (e.g. `page-load`, `url-verification`)
    #[serde(default)]
    pub breakers: HashMap<String, BreakerOverride>,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
}

/// Whether breaker counters are shared by every worker or owned per site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BreakerScope {
    #[default]
    Process,
    Site,
}

/// Crawl session behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Default page-visit budget for one site
    pub max_pages_per_site: u32,

    /// Floor the budget never shrinks below when golden URLs are known
    pub min_pages_per_site: u32,

    /// Budget removed for each golden URL the site already has
    pub golden_budget_reduction: u32,

    /// Number of sites crawled concurrently
    pub max_concurrent_sites: u32,

    /// Static navigation extraction yielding fewer links than this triggers
    /// browser-rendered navigation discovery
    pub min_nav_links: usize,

    /// Maximum sub-sitemaps expanded from one sitemap index
    pub sitemap_fanout: usize,

    /// Ranked candidate pages tried per schedule type before giving up
    pub max_extraction_attempts: usize,

    /// Consecutive bot-blocked page fetches before switching to the browser
    pub block_streak: u32,

    pub breaker_scope: BreakerScope,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages_per_site: 50,
            min_pages_per_site: 10,
            golden_budget_reduction: 15,
            max_concurrent_sites: 4,
            min_nav_links: 5,
            sitemap_fanout: 5,
            max_extraction_attempts: 3,
            block_streak: 2,
            breaker_scope: BreakerScope::Process,
        }
    }
}

/// Rate limiting and robots.txt behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum delay between requests to one origin when robots.txt sets none
    pub default_crawl_delay_secs: f64,

    /// Upper bound of the random jitter added on top of the delay
    pub max_jitter_secs: f64,

    /// Hours before a cached robots.txt is refetched
    pub robots_ttl_hours: i64,

    /// Refuse plain-HTTP connections
    pub https_only: bool,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            default_crawl_delay_secs: 2.0,
            max_jitter_secs: 3.0,
            robots_ttl_hours: 24,
            https_only: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,

    /// Additional full user-agent strings to rotate through
    #[serde(default)]
    pub rotation: Vec<String>,
}

impl UserAgentConfig {
    /// Formats the identifying user-agent string
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn identity(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

/// URL priority scoring constants
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScoringConfig {
    pub same_domain_bonus: f64,
    pub depth_bonus: f64,
    /// Paths deeper than this many segments earn the depth bonus
    pub depth_threshold: usize,
    pub negative_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            same_domain_bonus: 10.0,
            depth_bonus: 1.0,
            depth_threshold: 2,
            negative_penalty: 2.0,
        }
    }
}

/// Extraction chain configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// Schedule types looked for on every site
    pub schedule_types: Vec<ScheduleType>,

    /// Adaptive AI acceptance threshold before adjustments
    pub threshold_base: f64,
    pub threshold_min: f64,
    pub threshold_max: f64,

    /// Threshold discount per ten keyword hits per thousand words
    pub density_weight: f64,
    pub max_density_discount: f64,

    pub long_content_chars: usize,
    pub long_content_discount: f64,
    pub short_content_chars: usize,
    pub short_content_penalty: f64,

    /// Confidence at or above which a source URL becomes golden
    pub golden_min_confidence: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            schedule_types: ScheduleType::all().to_vec(),
            threshold_base: 70.0,
            threshold_min: 40.0,
            threshold_max: 90.0,
            density_weight: 2.0,
            max_density_discount: 20.0,
            long_content_chars: 2000,
            long_content_discount: 10.0,
            short_content_chars: 300,
            short_content_penalty: 10.0,
            golden_min_confidence: 75,
        }
    }
}

/// Keyword-weight store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct KeywordConfig {
    /// Optional TOML file of keyword entries
    pub file: Option<String>,

    /// Read keywords from the `keywords` table of the database
    pub use_database: bool,

    /// Use the built-in table when no store yields keywords
    pub allow_fallback: bool,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            file: None,
            use_database: true,
            allow_fallback: true,
        }
    }
}

/// OpenAI-compatible chat completion backend
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AiConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Page text is truncated to this many characters before prompting
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Per-request timeout
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

fn default_ai_timeout() -> u64 {
    30
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_content_chars() -> usize {
    8000
}

/// Headless rendering service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// Render endpoint accepting `POST {"url", "timeout_ms"}`
    pub endpoint: String,
    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,
}

fn default_browser_timeout() -> u64 {
    30
}

/// Partial breaker configuration; unset fields keep the preset value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_secs: Option<f64>,
    pub success_threshold: Option<u32>,
    pub request_timeout_secs: Option<f64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<f64>,
}

/// A target site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub group: Option<String>,
}
