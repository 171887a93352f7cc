use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
///
/// # Arguments
///
/// * `content` - The TOML document
///
/// # Returns
///
/// * `Ok(Config)` - A configuration that passed validation
/// * `Err(ConfigError)` - The TOML is malformed or a value is out of range
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored on every run row so results can be traced back to the
/// configuration that produced them.
///
/// # Returns
///
/// The lowercase hex digest of the file bytes
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerScope;
    use crate::extraction::ScheduleType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const MINIMAL: &str = r#"
[crawler]
max-pages-per-site = 30

[user-agent]
crawler-name = "ScheduleScout"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./scout.db"
summary-path = "./summary.md"

[[site]]
id = 1
name = "St. Example"
url = "https://stexample.org/"
group = "diocese-a"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_pages_per_site, 30);
        assert_eq!(config.crawler.min_pages_per_site, 10);
        assert_eq!(config.crawler.breaker_scope, BreakerScope::Process);
        assert_eq!(config.user_agent.crawler_name, "ScheduleScout");
        assert_eq!(config.sites.len(), 1);
        assert_eq!(config.sites[0].group.as_deref(), Some("diocese-a"));
        assert!(config.ai.is_none());
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.politeness.default_crawl_delay_secs, 2.0);
        assert_eq!(config.politeness.max_jitter_secs, 3.0);
        assert_eq!(config.scoring.same_domain_bonus, 10.0);
        assert_eq!(config.extraction.golden_min_confidence, 75);
        assert_eq!(config.extraction.schedule_types.len(), 3);
        assert!(config.keywords.allow_fallback);
    }

    #[test]
    fn test_sections_parse() {
        let content = format!(
            "{}{}",
            MINIMAL,
            r#"
[extraction]
schedule-types = ["reconciliation", "adoration"]
threshold-base = 65.0

[ai]
endpoint = "https://llm.example.com/v1"
model = "small-model"

[breakers.page-load]
failure-threshold = 8
"#
        );
        let config = parse_config(&content).unwrap();
        assert_eq!(
            config.extraction.schedule_types,
            vec![ScheduleType::Reconciliation, ScheduleType::Adoration]
        );
        assert_eq!(config.extraction.threshold_base, 65.0);
        let ai = config.ai.unwrap();
        assert_eq!(ai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(
            config.breakers.get("page-load").unwrap().failure_threshold,
            Some(8)
        );
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/scout.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = MINIMAL.replace("max-pages-per-site = 30", "max-pages-per-site = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
