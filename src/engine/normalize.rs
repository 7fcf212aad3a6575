//! Gates and conversions between upstream handles and stored records

use crate::model::{Issue, Language, Repo};
use crate::upstream::{IssueHandle, LanguageShares, RepoHandle};
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Returns true if the repository is neither archived nor disabled
pub fn is_active_repo(handle: &RepoHandle) -> bool {
    !handle.archived && !handle.disabled
}

/// Returns true if `language` has the largest byte count among the shares
///
/// Ties count as dominant. Names are compared case-insensitively, and a
/// repository with no (or only empty) shares has no dominant language.
pub fn is_dominant_language(shares: &LanguageShares, language: &Language) -> bool {
    let Some(max) = shares.values().copied().max() else {
        return false;
    };
    max > 0
        && shares
            .iter()
            .any(|(name, bytes)| *bytes == max && language.matches(name))
}

/// Returns true if an issue may be stored: open, unlocked and not a pull request
pub fn is_qualifying_issue(issue: &IssueHandle) -> bool {
    !issue.is_closed() && !issue.locked && !issue.is_pull_request()
}

/// Builds a repository record from an upstream handle
///
/// The record carries no issues and is stamped as refreshed at `now`.
pub fn repo_from_handle(
    handle: &RepoHandle,
    language: &Language,
    now: DateTime<Utc>,
) -> Result<Repo> {
    let context = format!("repository {}", handle.full_name);

    Ok(Repo {
        repo_id: handle.id,
        language_id: language.id,
        is_public: handle.is_public(),
        is_archived: handle.archived,
        is_template: handle.is_template,
        is_disabled: handle.disabled,
        name: handle.name.clone(),
        full_name: handle.full_name.clone(),
        description: handle.description.clone(),
        html_url: handle.html_url.clone(),
        url: handle.url.clone(),
        forks_count: handle.forks_count,
        stargazers_count: handle.stargazers_count,
        watchers_count: handle.watchers_count,
        pushed_at: parse_optional_timestamp(&context, "pushed_at", handle.pushed_at.as_deref())?,
        created_at: parse_timestamp(&context, "created_at", handle.created_at.as_deref())?,
        updated_at: parse_timestamp(&context, "updated_at", handle.updated_at.as_deref())?,
        refreshed_at: now,
        issues: BTreeMap::new(),
    })
}

/// Overwrites the repository's metadata from a fresh handle, keeping its issues
pub fn apply_repo_handle(
    repo: &mut Repo,
    handle: &RepoHandle,
    language: &Language,
    now: DateTime<Utc>,
) -> Result<()> {
    let fresh = repo_from_handle(handle, language, now)?;
    let issues = std::mem::take(&mut repo.issues);
    *repo = Repo { issues, ..fresh };
    Ok(())
}

/// Builds an issue record from an upstream handle
pub fn issue_from_handle(handle: &IssueHandle) -> Result<Issue> {
    let context = format!("issue {} (#{})", handle.id, handle.number);

    Ok(Issue {
        issue_id: handle.id,
        number: handle.number,
        title: handle.title.clone(),
        html_url: handle.html_url.clone(),
        url: handle.url.clone(),
        is_locked: handle.locked,
        comments_count: handle.comments,
        created_at: parse_timestamp(&context, "created_at", handle.created_at.as_deref())?,
        updated_at: parse_timestamp(&context, "updated_at", handle.updated_at.as_deref())?,
        closed_at: parse_optional_timestamp(&context, "closed_at", handle.closed_at.as_deref())?,
    })
}

/// Overwrites an issue's mutable fields from a fresh handle
///
/// Identity (id and number) stays as stored.
pub fn apply_issue_handle(issue: &mut Issue, handle: &IssueHandle) -> Result<()> {
    let fresh = issue_from_handle(handle)?;
    *issue = Issue {
        issue_id: issue.issue_id,
        number: issue.number,
        ..fresh
    };
    Ok(())
}

/// Parses a required RFC 3339 timestamp
pub fn parse_timestamp(
    context: &str,
    field: &'static str,
    value: Option<&str>,
) -> Result<DateTime<Utc>> {
    match value {
        Some(raw) => parse_rfc3339(context, field, raw),
        None => Err(HarvestError::temporal(context, field, "missing")),
    }
}

fn parse_optional_timestamp(
    context: &str,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|raw| parse_rfc3339(context, field, raw))
        .transpose()
}

fn parse_rfc3339(context: &str, field: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| HarvestError::temporal(context, field, format!("'{}': {}", raw, e)))
}
