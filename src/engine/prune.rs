//! Prune phase: delete stale or empty repositories

use super::{cutoff_before_now, CrawlEngine, PhaseReport};
use crate::model::{Language, Phase};
use crate::storage::Storage;
use crate::upstream::UpstreamClient;
use crate::Result;

impl<S, U> CrawlEngine<S, U>
where
    S: Storage + Send,
    U: UpstreamClient,
{
    /// Runs the prune phase over every tracked language
    ///
    /// Prune makes no upstream calls and keeps no checkpoints. A failure on one
    /// language is logged and the remaining languages are still pruned.
    pub(super) fn prune(&self) -> Result<PhaseReport> {
        let mut report = PhaseReport::new(Phase::Prune);
        let languages = self.with_storage(|s| s.list_languages())?;

        for language in &languages {
            match self.prune_language(language, &mut report) {
                Ok(()) => report.languages_completed += 1,
                Err(e) => {
                    tracing::error!("Failed to prune {}: {}", language, e);
                    report.languages_deferred += 1;
                }
            }
        }

        Ok(report)
    }

    /// Deletes every repository of a language that was not refreshed within
    /// the prune threshold or has no issues left
    fn prune_language(&self, language: &Language, report: &mut PhaseReport) -> Result<()> {
        let cutoff = cutoff_before_now(self.settings.prune_after);
        let repos = self.with_storage(|s| s.list_repos_pending_prune(language.id, cutoff))?;

        for repo in &repos {
            if self.with_storage(|s| s.delete_repo(repo.repo_id))? {
                tracing::debug!("Pruned {}", repo.full_name);
                report.repos_deleted += 1;
            }
        }

        if !repos.is_empty() {
            tracing::info!("Pruned {} repositories of {}", repos.len(), language);
        }

        Ok(())
    }
}
