//! Storage traits and error types
//!
//! The crawl engine only talks to storage through these traits. They are split
//! by concern (tracked languages, job checkpoints, mirrored repositories, run
//! history); [`Storage`] bundles all of them for backends that implement the
//! full set.

use crate::model::{Issue, Language, Phase, Repo};
use crate::storage::{JobRecord, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Repository not found: {0}")]
    RepoNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt value in column '{column}': {value}")]
    CorruptValue { column: &'static str, value: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Supplies the set of tracked languages
pub trait LanguageSource {
    /// Lists all tracked languages in a stable order
    fn list_languages(&self) -> StorageResult<Vec<Language>>;

    /// Inserts any of the given language names that are not tracked yet
    ///
    /// Existing languages keep their ids. Returns the full tracked set.
    fn sync_languages(&mut self, names: &[String]) -> StorageResult<Vec<Language>>;
}

/// Per (phase, language) completion checkpoints
pub trait JobTracker {
    /// Gets the completion time of a language for the current cycle of a phase
    ///
    /// `None` means the language is still pending this cycle.
    fn get_job(&self, phase: Phase, language_id: i64) -> StorageResult<Option<DateTime<Utc>>>;

    /// Marks a language complete for the current cycle of a phase
    fn mark_complete(
        &mut self,
        phase: Phase,
        language_id: i64,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Clears every completion marker of a phase, starting a new cycle
    fn reset_all(&mut self, phase: Phase) -> StorageResult<()>;

    /// Lists all job rows
    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>>;
}

/// Mirrored repositories and the issues they own
pub trait RepoStore {
    /// Inserts a repository or overwrites an existing one, replacing its issues
    fn upsert_repo(&mut self, repo: &Repo) -> StorageResult<()>;

    /// Overwrites an existing repository, replacing its issues
    ///
    /// Fails with [`StorageError::RepoNotFound`] if the repository is not stored.
    fn save_repo(&mut self, repo: &Repo) -> StorageResult<()>;

    /// Deletes a repository together with all of its issues
    ///
    /// Returns false if nothing was stored under the id.
    fn delete_repo(&mut self, repo_id: i64) -> StorageResult<bool>;

    /// Gets a repository with its issues
    fn get_repo(&self, repo_id: i64) -> StorageResult<Option<Repo>>;

    /// Lists repositories of a language last refreshed at or before `cutoff`
    ///
    /// Returned records carry no issues; see [`RepoStore::list_open_issues`].
    fn list_repos_pending_refresh(
        &self,
        language_id: i64,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<Repo>>;

    /// Lists repositories of a language that should be deleted
    ///
    /// A repository qualifies when it was last refreshed at or before `cutoff`
    /// or has no issues left.
    fn list_repos_pending_prune(
        &self,
        language_id: i64,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<Repo>>;

    /// Lists the stored open issues of a repository, ordered by issue id
    fn list_open_issues(&self, repo_id: i64) -> StorageResult<Vec<Issue>>;

    /// Counts repositories filed under a language
    fn count_repos(&self, language_id: i64) -> StorageResult<u64>;

    /// Counts issues of all repositories filed under a language
    fn count_issues(&self, language_id: i64) -> StorageResult<u64>;
}

/// History of phase runs
pub trait RunLog {
    /// Records the start of a phase run and returns its id
    fn create_run(&mut self, phase: Phase, config_hash: &str) -> StorageResult<i64>;

    /// Records the end of a phase run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks runs left in the running state by a previous process as interrupted
    ///
    /// Returns the number of runs updated.
    fn mark_interrupted_runs(&mut self) -> StorageResult<usize>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;
}

/// Full storage backend used by the crawl engine
pub trait Storage: LanguageSource + JobTracker + RepoStore + RunLog {}

impl<T: LanguageSource + JobTracker + RepoStore + RunLog> Storage for T {}
