use crate::config::types::{
    Config, FetcherConfig, FreshnessConfig, OutputConfig, SourceConfig, SyncConfig, WatchdogConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_freshness_config(&config.freshness)?;
    validate_sync_config(&config.sync)?;
    validate_watchdog_config(&config.watchdog)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the entry point
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.entry_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid entry-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "entry-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates request pacing
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.request_delay_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "request-delay-ms must be <= 60000, got {}",
            config.request_delay_ms
        )));
    }
    Ok(())
}

/// Validates freshness thresholds
///
/// Younger data changes more often, so its threshold must be tighter.
fn validate_freshness_config(config: &FreshnessConfig) -> Result<(), ConfigError> {
    if config.open_hours == 0 {
        return Err(ConfigError::Validation(
            "open-hours must be >= 1".to_string(),
        ));
    }

    if config.open_hours >= config.closing_hours {
        return Err(ConfigError::Validation(format!(
            "open-hours ({}) must be less than closing-hours ({})",
            config.open_hours, config.closing_hours
        )));
    }

    if config.closing_hours > config.closed_hours {
        return Err(ConfigError::Validation(format!(
            "closing-hours ({}) must not exceed closed-hours ({})",
            config.closing_hours, config.closed_hours
        )));
    }

    if !(-720..=840).contains(&config.utc_offset_minutes) {
        return Err(ConfigError::Validation(format!(
            "utc-offset-minutes must be between -720 and 840, got {}",
            config.utc_offset_minutes
        )));
    }

    Ok(())
}

/// Validates worker pool settings
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }
    Ok(())
}

/// Validates watchdog timings
fn validate_watchdog_config(config: &WatchdogConfig) -> Result<(), ConfigError> {
    if config.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "poll-interval-secs must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs < config.poll_interval_secs {
        return Err(ConfigError::Validation(format!(
            "watchdog timeout-secs ({}) must be >= poll-interval-secs ({})",
            config.timeout_secs, config.poll_interval_secs
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}
