use crate::config::types::{
    Config, GitHubConfig, LanguageEntry, PhaseSchedule, ScheduleConfig, StorageConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Longest accepted timer delay or refresh threshold: one year
const MAX_MINUTES: u64 = 366 * 24 * 60;

/// Longest accepted prune threshold: ten years
const MAX_PRUNE_AFTER_HOURS: u64 = 10 * 366 * 24;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_github_config(&config.github)?;
    validate_schedule_config(&config.schedule)?;
    validate_storage_config(&config.storage)?;
    validate_languages(&config.languages)?;
    Ok(())
}

/// Validates GitHub client configuration
fn validate_github_config(config: &GitHubConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.api_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "api-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if !(1..=100).contains(&config.per_page) {
        return Err(ConfigError::Validation(format!(
            "per-page must be between 1 and 100, got {}",
            config.per_page
        )));
    }

    if !(1..=100).contains(&config.max_issues_per_repo) {
        return Err(ConfigError::Validation(format!(
            "max-issues-per-repo must be between 1 and 100, got {}",
            config.max_issues_per_repo
        )));
    }

    if config.max_search_pages < 1 {
        return Err(ConfigError::Validation(
            "max-search-pages must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the three phase timers
fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    for (name, schedule) in [
        ("ingest", &config.ingest),
        ("refresh", &config.refresh),
        ("prune", &config.prune),
    ] {
        validate_phase_schedule(name, schedule)?;
    }
    Ok(())
}

fn validate_phase_schedule(name: &str, schedule: &PhaseSchedule) -> Result<(), ConfigError> {
    if schedule.interval_mins < 1 {
        return Err(ConfigError::Validation(format!(
            "schedule.{}.interval-mins must be >= 1",
            name
        )));
    }

    for (field, value) in [
        ("initial-delay-mins", schedule.initial_delay_mins),
        ("interval-mins", schedule.interval_mins),
    ] {
        if value > MAX_MINUTES {
            return Err(ConfigError::Validation(format!(
                "schedule.{}.{} must be <= {}, got {}",
                name, field, MAX_MINUTES, value
            )));
        }
    }
    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.refresh_after_mins > MAX_MINUTES {
        return Err(ConfigError::Validation(format!(
            "refresh-after-mins must be <= {}, got {}",
            MAX_MINUTES, config.refresh_after_mins
        )));
    }

    if config.prune_after_hours > MAX_PRUNE_AFTER_HOURS {
        return Err(ConfigError::Validation(format!(
            "prune-after-hours must be <= {}, got {}",
            MAX_PRUNE_AFTER_HOURS, config.prune_after_hours
        )));
    }
    Ok(())
}

/// Validates the tracked language list
fn validate_languages(languages: &[LanguageEntry]) -> Result<(), ConfigError> {
    if languages.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[language]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in languages {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "language name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "language '{}' is listed more than once",
                name
            )));
        }
    }

    Ok(())
}
