//! Ingest phase: discover repositories of a language and store qualifying ones

use super::normalize;
use super::{log_rate_limit, CrawlEngine, LanguageOutcome, PhaseReport};
use crate::model::{Language, Phase};
use crate::storage::Storage;
use crate::upstream::{RepoHandle, UpstreamClient};
use crate::Result;
use chrono::Utc;

/// What happened to one search result
enum CandidateOutcome {
    Stored { issues: usize },
    Skipped(&'static str),
    RateLimited,
}

impl<S, U> CrawlEngine<S, U>
where
    S: Storage + Send,
    U: UpstreamClient,
{
    /// Searches repositories of a language and stores every one that passes
    /// the activity, dominance and qualifying-issue gates
    pub(super) async fn ingest_language(
        &self,
        language: &Language,
        report: &mut PhaseReport,
    ) -> Result<LanguageOutcome> {
        let candidates = match self.upstream.list_repositories_by_language(language).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_rate_limit() => {
                log_rate_limit(Phase::Ingest, language, &e);
                return Ok(LanguageOutcome::RateLimited);
            }
            Err(e) => {
                tracing::warn!("Repository search for {} failed, deferring: {}", language, e);
                return Ok(LanguageOutcome::Deferred);
            }
        };

        tracing::info!(
            "Found {} candidate repositories for {}",
            candidates.len(),
            language
        );

        for handle in &candidates {
            match self.ingest_candidate(language, handle).await? {
                CandidateOutcome::Stored { issues } => {
                    tracing::debug!("Stored {} with {} open issues", handle.full_name, issues);
                    report.repos_stored += 1;
                    report.issues_stored += issues;
                }
                CandidateOutcome::Skipped(reason) => {
                    tracing::debug!("Skipping {}: {}", handle.full_name, reason);
                    report.repos_skipped += 1;
                }
                CandidateOutcome::RateLimited => {
                    tracing::info!(
                        "Ingest of {} hit the rate limit at {}, aborting run",
                        language,
                        handle.full_name
                    );
                    return Ok(LanguageOutcome::RateLimited);
                }
            }
        }

        Ok(LanguageOutcome::Finished)
    }

    async fn ingest_candidate(
        &self,
        language: &Language,
        handle: &RepoHandle,
    ) -> Result<CandidateOutcome> {
        if !normalize::is_active_repo(handle) {
            return Ok(CandidateOutcome::Skipped("archived or disabled"));
        }

        let shares = match self.upstream.get_language_shares(handle).await {
            Ok(shares) => shares,
            Err(e) if e.is_rate_limit() => return Ok(CandidateOutcome::RateLimited),
            Err(e) => {
                tracing::error!("Failed to get languages of {}: {}", handle.full_name, e);
                return Ok(CandidateOutcome::Skipped("language shares unavailable"));
            }
        };
        if !normalize::is_dominant_language(&shares, language) {
            return Ok(CandidateOutcome::Skipped("language is not dominant"));
        }

        let issues = match self.upstream.list_issues(handle).await {
            Ok(issues) => issues,
            Err(e) if e.is_rate_limit() => return Ok(CandidateOutcome::RateLimited),
            Err(e) => {
                tracing::warn!("Failed to list issues of {}: {}", handle.full_name, e);
                return Ok(CandidateOutcome::Skipped("issues unavailable"));
            }
        };

        let qualifying = issues
            .iter()
            .filter(|issue| normalize::is_qualifying_issue(issue))
            .map(normalize::issue_from_handle)
            .collect::<Result<Vec<_>>>()?;
        if qualifying.is_empty() {
            return Ok(CandidateOutcome::Skipped("no open, unlocked issues"));
        }

        let mut repo = normalize::repo_from_handle(handle, language, Utc::now())?;
        repo.set_issues(qualifying);
        let stored = repo.issues.len();

        self.with_storage(|s| s.upsert_repo(&repo))?;

        Ok(CandidateOutcome::Stored { issues: stored })
    }
}
