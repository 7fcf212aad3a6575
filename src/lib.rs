//! Issue-Harvest: a resumable, rate-limit-aware repository crawler
//!
//! This crate periodically crawls the GitHub API for repositories written in a
//! set of tracked languages, keeps their open issues mirrored in a local SQLite
//! database, refreshes that mirror over time and prunes entries that went stale.
//! Every crawl phase checkpoints its progress per language, so a rate limit or a
//! restart never loses finished work.

pub mod config;
pub mod engine;
pub mod model;
pub mod output;
pub mod storage;
pub mod upstream;

use thiserror::Error;

/// Main error type for Issue-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] upstream::UpstreamError),

    #[error("Unreadable timestamp '{field}' on {context}: {message}")]
    TemporalData {
        context: String,
        field: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Creates a temporal data error for a timestamp field of an upstream record
    pub fn temporal(
        context: impl Into<String>,
        field: &'static str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::TemporalData {
            context: context.into(),
            field,
            message: message.to_string(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Issue-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::{CrawlEngine, PhaseOutcome, PhaseReport, Scheduler};
pub use model::{Issue, Language, Phase, Repo};
pub use upstream::{UpstreamClient, UpstreamError};
