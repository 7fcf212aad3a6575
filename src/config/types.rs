use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Issue-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub storage: StorageConfig,
    #[serde(default, rename = "language")]
    pub languages: Vec<LanguageEntry>,
}

/// GitHub API client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// Base URL of the REST API
    #[serde(rename = "api-url", default = "default_api_url")]
    pub api_url: String,

    /// Personal access token; falls back to `GITHUB_TOKEN` when unset
    #[serde(default)]
    pub token: Option<String>,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Page size for repository search
    #[serde(rename = "per-page", default = "default_per_page")]
    pub per_page: u32,

    /// Maximum number of search pages fetched per language
    #[serde(rename = "max-search-pages", default = "default_max_search_pages")]
    pub max_search_pages: u32,

    /// Maximum number of open issues listed per repository
    #[serde(rename = "max-issues-per-repo", default = "default_per_page")]
    pub max_issues_per_repo: u32,

    /// Extra qualifiers appended to the repository search query
    #[serde(rename = "search-qualifiers", default = "default_search_qualifiers")]
    pub search_qualifiers: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl GitHubConfig {
    /// Returns the configured token, or the `GITHUB_TOKEN` environment variable
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            user_agent: default_user_agent(),
            per_page: default_per_page(),
            max_search_pages: default_max_search_pages(),
            max_issues_per_repo: default_per_page(),
            search_qualifiers: default_search_qualifiers(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Timer settings for all three phases
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "PhaseSchedule::ingest")]
    pub ingest: PhaseSchedule,
    #[serde(default = "PhaseSchedule::refresh")]
    pub refresh: PhaseSchedule,
    #[serde(default = "PhaseSchedule::prune")]
    pub prune: PhaseSchedule,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingest: PhaseSchedule::ingest(),
            refresh: PhaseSchedule::refresh(),
            prune: PhaseSchedule::prune(),
        }
    }
}

/// Initial delay and repeat interval of one phase timer
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PhaseSchedule {
    /// Delay before the first run (minutes)
    #[serde(rename = "initial-delay-mins")]
    pub initial_delay_mins: u64,

    /// Delay between consecutive runs (minutes)
    #[serde(rename = "interval-mins")]
    pub interval_mins: u64,
}

impl PhaseSchedule {
    fn ingest() -> Self {
        Self {
            initial_delay_mins: 30,
            interval_mins: 4 * 60,
        }
    }

    fn refresh() -> Self {
        Self {
            initial_delay_mins: 60,
            interval_mins: 2 * 60,
        }
    }

    fn prune() -> Self {
        Self {
            initial_delay_mins: 12 * 60,
            interval_mins: 12 * 60,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_mins.saturating_mul(60))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_mins.saturating_mul(60))
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Repositories not refreshed for this long are picked up by Refresh (minutes)
    #[serde(rename = "refresh-after-mins", default = "default_refresh_after_mins")]
    pub refresh_after_mins: u64,

    /// Repositories not refreshed for this long are deleted by Prune (hours)
    #[serde(rename = "prune-after-hours", default = "default_prune_after_hours")]
    pub prune_after_hours: u64,
}

/// A tracked programming language
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageEntry {
    /// Language name as GitHub reports it (e.g., "Rust", "C++")
    pub name: String,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    format!("issue-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_per_page() -> u32 {
    100
}

fn default_max_search_pages() -> u32 {
    10
}

fn default_search_qualifiers() -> String {
    "is:public archived:false".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_after_mins() -> u64 {
    120
}

fn default_prune_after_hours() -> u64 {
    72
}
