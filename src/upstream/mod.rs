//! Upstream code-hosting API boundary
//!
//! This module defines what the crawl engine needs from the platform it
//! mirrors:
//! - The [`UpstreamClient`] trait (repository search, language shares,
//!   issue listing, single repository and single issue lookups)
//! - [`UpstreamError`], the closed set of failure kinds every call can return
//! - Raw [`RepoHandle`] / [`IssueHandle`] records as the API returns them
//!
//! [`GitHubClient`] is the production implementation.

mod github;

pub use github::{build_http_client, GitHubClient};

use crate::model::Language;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure kinds of an upstream call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpstreamError {
    /// The API quota is exhausted
    #[error("Rate limit exceeded (resets at {reset_at:?})")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested resource existed but was deleted
    #[error("Gone: {0}")]
    Gone(String),

    /// The response could not be decoded
    #[error("Unreadable response: {0}")]
    DataUnavailable(String),

    /// Network failure or unexpected status; the next run may succeed
    #[error("Transient failure: {0}")]
    TransientFailure(String),
}

impl UpstreamError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns true if upstream confirmed the resource no longer exists
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Gone(_))
    }
}

/// Result type for upstream calls
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Language name to byte count, as reported for one repository
pub type LanguageShares = BTreeMap<String, u64>;

/// A repository as returned by the upstream API
///
/// Timestamps are kept as the raw strings upstream sent; they are parsed when
/// the handle is normalized into a [`crate::model::Repo`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RepoHandle {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    pub url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub forks_count: u32,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub watchers_count: u32,
    #[serde(default)]
    pub pushed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl RepoHandle {
    pub fn is_public(&self) -> bool {
        match &self.visibility {
            Some(visibility) => visibility == "public",
            None => !self.private,
        }
    }
}

/// An issue (or pull request) as returned by the upstream API
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IssueHandle {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub html_url: String,
    pub url: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub comments: u32,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub closed_at: Option<String>,
    /// Present only when the issue is a pull request
    #[serde(default)]
    pub pull_request: Option<IgnoredAny>,
}

impl IssueHandle {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state.eq_ignore_ascii_case("closed") || self.closed_at.is_some()
    }
}

/// Operations the crawl engine performs against the upstream platform
///
/// Every call may fail with [`UpstreamError::RateLimited`]; the engine treats
/// that as a signal to abort the whole phase run.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Searches repositories whose primary language is `language`
    async fn list_repositories_by_language(
        &self,
        language: &Language,
    ) -> UpstreamResult<Vec<RepoHandle>>;

    /// Gets the per-language byte counts of a repository
    async fn get_language_shares(&self, repo: &RepoHandle) -> UpstreamResult<LanguageShares>;

    /// Lists the open issues of a repository (pull requests included)
    async fn list_issues(&self, repo: &RepoHandle) -> UpstreamResult<Vec<IssueHandle>>;

    /// Looks up a repository by its upstream id
    ///
    /// Fails with [`UpstreamError::NotFound`] when the repository is gone.
    async fn get_repository_by_id(&self, repo_id: i64) -> UpstreamResult<RepoHandle>;

    /// Looks up one issue by number
    ///
    /// Returns `Ok(None)` when the issue does not exist and
    /// [`UpstreamError::Gone`] when it was deleted.
    async fn get_issue_by_number(
        &self,
        repo: &RepoHandle,
        number: i64,
    ) -> UpstreamResult<Option<IssueHandle>>;
}
