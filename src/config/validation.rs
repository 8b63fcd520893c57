use crate::config::types::{Config, CrawlerConfig, OutputConfig, SnapshotConfig, SourceConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_snapshot_config(&config.snapshot)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the remote source settings
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if !config.listing_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "listing-path must start with '/', got '{}'",
            config.listing_path
        )));
    }

    if !config.item_path.contains("{id}") {
        return Err(ConfigError::Validation(format!(
            "item-path must contain the {{id}} placeholder, got '{}'",
            config.item_path
        )));
    }

    if config.page_size == 0 {
        return Err(ConfigError::Validation(
            "page-size must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.season_length == 0 || config.max_season == 0 {
        return Err(ConfigError::Validation(
            "season-length and max-season must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_snapshot_config(config: &SnapshotConfig) -> Result<(), ConfigError> {
    if config.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "snapshot path cannot be empty".to_string(),
        ));
    }

    if config.target_count == 0 {
        return Err(ConfigError::Validation(
            "target-count must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl pacing, retry and checkpoint settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    if config.batch_delay_ms < config.item_delay_ms {
        return Err(ConfigError::Validation(format!(
            "batch-delay-ms ({}) must not be shorter than item-delay-ms ({})",
            config.batch_delay_ms, config.item_delay_ms
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 0 and 10, got {}",
            config.max_retries
        )));
    }

    if config.backoff_base_ms == 0 {
        return Err(ConfigError::Validation(
            "backoff-base-ms must be >= 1".to_string(),
        ));
    }

    if config.backoff_factor < 1 {
        return Err(ConfigError::Validation(
            "backoff-factor must be >= 1".to_string(),
        ));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) must be >= backoff-base-ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.fetch_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_every == 0 || config.progress_every == 0 {
        return Err(ConfigError::Validation(
            "checkpoint-every and progress-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.checkpoint_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint-dir cannot be empty".to_string(),
        ));
    }

    if config.merged_csv.as_os_str().is_empty() || config.merged_json.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "merged-csv and merged-json cannot be empty".to_string(),
        ));
    }

    if config.summary_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "summary-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
