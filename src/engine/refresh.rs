//! Refresh phase: re-check stale repositories and their open issues

use super::normalize;
use super::{cutoff_before_now, log_rate_limit, CrawlEngine, LanguageOutcome, PhaseReport};
use crate::model::{Language, Phase, Repo};
use crate::storage::Storage;
use crate::upstream::{UpstreamClient, UpstreamError};
use crate::Result;
use chrono::Utc;

/// What happened to one stored repository
enum RepoOutcome {
    Saved,
    Deleted(&'static str),
    Untouched(&'static str),
    RateLimited(UpstreamError),
}

impl<S, U> CrawlEngine<S, U>
where
    S: Storage + Send,
    U: UpstreamClient,
{
    /// Refreshes every repository of a language that went stale
    pub(super) async fn refresh_language(
        &self,
        language: &Language,
        report: &mut PhaseReport,
    ) -> Result<LanguageOutcome> {
        let cutoff = cutoff_before_now(self.settings.refresh_after);
        let repos = self.with_storage(|s| s.list_repos_pending_refresh(language.id, cutoff))?;

        tracing::info!(
            "{} repositories of {} pending refresh",
            repos.len(),
            language
        );

        for repo in repos {
            let full_name = repo.full_name.clone();
            match self.refresh_repo(language, repo, report).await? {
                RepoOutcome::Saved => {
                    report.repos_updated += 1;
                }
                RepoOutcome::Deleted(reason) => {
                    tracing::info!("Deleted {}: {}", full_name, reason);
                    report.repos_deleted += 1;
                }
                RepoOutcome::Untouched(reason) => {
                    tracing::debug!("Left {} unchanged: {}", full_name, reason);
                    report.repos_skipped += 1;
                }
                RepoOutcome::RateLimited(e) => {
                    log_rate_limit(Phase::Refresh, language, &e);
                    return Ok(LanguageOutcome::RateLimited);
                }
            }
        }

        Ok(LanguageOutcome::Finished)
    }

    /// Re-validates one repository against upstream
    ///
    /// The repository is deleted when upstream no longer has it, when it became
    /// archived or disabled, or when the language is no longer dominant.
    /// Otherwise its metadata is overwritten and each stored issue is re-fetched:
    /// issues that were closed, locked or removed are dropped, issues whose
    /// lookup failed transiently are kept as they were.
    async fn refresh_repo(
        &self,
        language: &Language,
        mut repo: Repo,
        report: &mut PhaseReport,
    ) -> Result<RepoOutcome> {
        let handle = match self.upstream.get_repository_by_id(repo.repo_id).await {
            Ok(handle) => handle,
            Err(e) if e.is_rate_limit() => return Ok(RepoOutcome::RateLimited(e)),
            Err(e) if e.is_removal() => {
                return self.delete_stored_repo(repo.repo_id, "no longer exists upstream");
            }
            Err(e) => {
                tracing::warn!("Failed to look up {}: {}", repo.full_name, e);
                return Ok(RepoOutcome::Untouched("lookup failed"));
            }
        };

        if !normalize::is_active_repo(&handle) {
            return self.delete_stored_repo(repo.repo_id, "archived or disabled");
        }

        let shares = match self.upstream.get_language_shares(&handle).await {
            Ok(shares) => shares,
            Err(e) if e.is_rate_limit() => return Ok(RepoOutcome::RateLimited(e)),
            Err(e) => {
                tracing::error!("Failed to get languages of {}: {}", handle.full_name, e);
                return Ok(RepoOutcome::Untouched("language shares unavailable"));
            }
        };
        if !normalize::is_dominant_language(&shares, language) {
            return self.delete_stored_repo(repo.repo_id, "language is no longer dominant");
        }

        normalize::apply_repo_handle(&mut repo, &handle, language, Utc::now())?;

        let stored_issues = self.with_storage(|s| s.list_open_issues(repo.repo_id))?;
        let mut retained = Vec::with_capacity(stored_issues.len());

        for mut issue in stored_issues {
            match self.upstream.get_issue_by_number(&handle, issue.number).await {
                Ok(Some(fresh)) if fresh.locked || fresh.is_closed() => {
                    tracing::debug!(
                        "Dropping {}#{}: closed or locked",
                        handle.full_name,
                        issue.number
                    );
                    report.issues_dropped += 1;
                }
                Ok(Some(fresh)) => {
                    normalize::apply_issue_handle(&mut issue, &fresh)?;
                    retained.push(issue);
                }
                Ok(None) => {
                    tracing::debug!("Dropping {}#{}: not found", handle.full_name, issue.number);
                    report.issues_dropped += 1;
                }
                Err(e) if e.is_rate_limit() => return Ok(RepoOutcome::RateLimited(e)),
                Err(e) if e.is_removal() => {
                    tracing::debug!("Dropping {}#{}: {}", handle.full_name, issue.number, e);
                    report.issues_dropped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to re-fetch {}#{}, keeping previous state: {}",
                        handle.full_name,
                        issue.number,
                        e
                    );
                    report.issues_preserved += 1;
                    retained.push(issue);
                }
            }
        }

        repo.set_issues(retained);
        self.with_storage(|s| s.save_repo(&repo))?;

        Ok(RepoOutcome::Saved)
    }

    fn delete_stored_repo(&self, repo_id: i64, reason: &'static str) -> Result<RepoOutcome> {
        self.with_storage(|s| s.delete_repo(repo_id))?;
        Ok(RepoOutcome::Deleted(reason))
    }
}
