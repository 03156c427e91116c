use crate::config::types::{Config, CrawlConfig, FetchConfig, OutputConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_fetch_config(&config.fetch)?;
    validate_crawl_config(&config.crawl)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the site root and date range
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if let Some(end) = config.end_date {
        if end < config.start_date {
            return Err(ConfigError::InvalidDate(format!(
                "end-date {} is before start-date {}",
                end, config.start_date
            )));
        }
    }

    Ok(())
}

/// Validates fetcher configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.rotate_agent_every < 1 {
        return Err(ConfigError::Validation(format!(
            "rotate-agent-every must be >= 1, got {}",
            config.rotate_agent_every
        )));
    }

    if config.user_agents.is_empty() || config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one non-empty entry".to_string(),
        ));
    }

    if config.rate_limit_ceiling_ms < config.request_delay_ms {
        return Err(ConfigError::Validation(format!(
            "rate-limit-ceiling-ms ({}) must be >= request-delay-ms ({})",
            config.rate_limit_ceiling_ms, config.request_delay_ms
        )));
    }

    Ok(())
}

/// Validates crawl loop configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.max_archive_pages < 1 {
        return Err(ConfigError::Validation(
            "max-archive-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("database-path", &config.database_path),
        ("corpus-dir", &config.corpus_dir),
        ("images-dir", &config.images_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let mut config = Config::default();
        config.site.base_url = "ftp://example.com".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.site.base_url = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_inverted_date_range() {
        let mut config = Config::default();
        config.site.start_date = NaiveDate::from_ymd_opt(2020, 5, 1).unwrap();
        config.site.end_date = Some(NaiveDate::from_ymd_opt(2020, 4, 1).unwrap());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidDate(_))));
    }

    #[test]
    fn test_rejects_empty_agent_pool() {
        let mut config = Config::default();
        config.fetch.user_agents.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.crawl.batch_size = 0;
        assert!(validate(&config).is_err());
    }
}
