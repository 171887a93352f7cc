use crate::breaker::OperationType;
use crate::config::types::{
    BreakerOverride, Config, CrawlerConfig, ExtractionConfig, OutputConfig, PolitenessConfig,
    SiteEntry, UserAgentConfig,
};
use crate::ConfigError;
use std::collections::{HashMap, HashSet};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_extraction_config(&config.extraction)?;
    validate_breakers(&config.breakers)?;
    validate_sites(&config.sites)?;

    if let Some(ai) = &config.ai {
        validate_endpoint("ai.endpoint", &ai.endpoint)?;
        if ai.model.is_empty() {
            return Err(ConfigError::Validation(
                "ai.model cannot be empty".to_string(),
            ));
        }
    }
    if let Some(browser) = &config.browser {
        validate_endpoint("browser.endpoint", &browser.endpoint)?;
    }

    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages_per_site < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages_per_site must be >= 1, got {}",
            config.max_pages_per_site
        )));
    }

    if config.min_pages_per_site < 1 || config.min_pages_per_site > config.max_pages_per_site {
        return Err(ConfigError::Validation(format!(
            "min_pages_per_site must be between 1 and max_pages_per_site ({}), got {}",
            config.max_pages_per_site, config.min_pages_per_site
        )));
    }

    if config.max_concurrent_sites < 1 || config.max_concurrent_sites > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_sites must be between 1 and 100, got {}",
            config.max_concurrent_sites
        )));
    }

    if config.max_extraction_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_extraction_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if !(config.default_crawl_delay_secs.is_finite() && config.default_crawl_delay_secs >= 0.0) {
        return Err(ConfigError::Validation(format!(
            "default_crawl_delay_secs must be >= 0, got {}",
            config.default_crawl_delay_secs
        )));
    }

    if !(config.max_jitter_secs.is_finite() && config.max_jitter_secs >= 0.0) {
        return Err(ConfigError::Validation(format!(
            "max_jitter_secs must be >= 0, got {}",
            config.max_jitter_secs
        )));
    }

    if config.robots_ttl_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "robots_ttl_hours must be >= 1, got {}",
            config.robots_ttl_hours
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name doubles as the robots.txt token: alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    if config.rotation.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agent rotation entries cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.schedule_types.is_empty() {
        return Err(ConfigError::Validation(
            "extraction.schedule_types cannot be empty".to_string(),
        ));
    }

    let tuning = [
        ("threshold_base", config.threshold_base),
        ("density_weight", config.density_weight),
        ("max_density_discount", config.max_density_discount),
        ("long_content_discount", config.long_content_discount),
        ("short_content_penalty", config.short_content_penalty),
    ];
    if let Some((name, value)) = tuning.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ConfigError::Validation(format!(
            "extraction.{} must be a finite number, got {}",
            name, value
        )));
    }

    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(config.threshold_min)
        || !in_range(config.threshold_max)
        || config.threshold_min > config.threshold_max
    {
        return Err(ConfigError::Validation(format!(
            "threshold bounds must satisfy 0 <= min <= max <= 100, got [{}, {}]",
            config.threshold_min, config.threshold_max
        )));
    }

    if config.golden_min_confidence > 100 {
        return Err(ConfigError::Validation(format!(
            "golden_min_confidence must be <= 100, got {}",
            config.golden_min_confidence
        )));
    }

    Ok(())
}

fn validate_breakers(breakers: &HashMap<String, BreakerOverride>) -> Result<(), ConfigError> {
    for (name, o) in breakers {
        if OperationType::from_name(name).is_none() {
            return Err(ConfigError::Validation(format!(
                "Unknown breaker operation '{}'",
                name
            )));
        }

        if o.failure_threshold == Some(0) || o.success_threshold == Some(0) {
            return Err(ConfigError::Validation(format!(
                "Breaker '{}' thresholds must be >= 1",
                name
            )));
        }

        let durations = [
            o.recovery_timeout_secs,
            o.request_timeout_secs,
            o.retry_delay_secs,
        ];
        if durations
            .iter()
            .flatten()
            .any(|secs| !(secs.is_finite() && *secs >= 0.0))
        {
            return Err(ConfigError::Validation(format!(
                "Breaker '{}' durations must be >= 0",
                name
            )));
        }
    }

    Ok(())
}

fn validate_sites(sites: &[SiteEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for site in sites {
        if !seen.insert(site.id) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site id {}",
                site.id
            )));
        }

        let url = Url::parse(&site.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid site URL '{}': {}", site.url, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "Site URL '{}' must use HTTP or HTTPS",
                site.url
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Site URL '{}' has no host",
                site.url
            )));
        }
    }

    Ok(())
}

fn validate_endpoint(field: &str, endpoint: &str) -> Result<(), ConfigError> {
    Url::parse(endpoint)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", field, e)))
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
