use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A repository mirrored from upstream, filed under one tracked language
#[derive(Debug, Clone, PartialEq)]
pub struct Repo {
    /// Upstream repository id
    pub repo_id: i64,

    /// Id of the tracked language this repository was filed under
    pub language_id: i64,

    pub is_public: bool,
    pub is_archived: bool,
    pub is_template: bool,
    pub is_disabled: bool,

    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub url: String,

    pub forks_count: u32,
    pub stargazers_count: u32,
    pub watchers_count: u32,

    pub pushed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// When this record was last written from upstream data
    pub refreshed_at: DateTime<Utc>,

    /// Retained issues keyed by upstream issue id
    ///
    /// Replaced wholesale whenever the repository is written.
    pub issues: BTreeMap<i64, Issue>,
}

impl Repo {
    /// Replaces the issue collection with the given issues
    pub fn set_issues(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues = issues
            .into_iter()
            .map(|issue| (issue.issue_id, issue))
            .collect();
    }
}

/// An open issue owned by a [`Repo`]
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Upstream issue id
    pub issue_id: i64,

    /// Issue number within its repository
    pub number: i64,

    pub title: String,
    pub html_url: String,
    pub url: String,
    pub is_locked: bool,
    pub comments_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}
