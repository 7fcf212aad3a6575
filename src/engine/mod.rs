//! Crawl engine - resumable phase orchestration
//!
//! This module contains the core crawling logic, including:
//! - The three phases (ingest, refresh, prune) as loops over the tracked languages
//! - Per (phase, language) checkpointing through the [`JobTracker`]
//! - The rate-limit abort protocol
//! - Per-phase mutual exclusion
//! - Fixed-delay timers driving each phase ([`Scheduler`])
//!
//! # Rate-limit protocol
//!
//! A rate-limit signal from any upstream call stops the current repository,
//! the current language and the language loop. The language is not marked
//! complete and the cycle is not reset, so the next invocation resumes at the
//! first incomplete language.
//!
//! [`JobTracker`]: crate::storage::JobTracker

mod ingest;
pub mod normalize;
mod prune;
mod refresh;
mod scheduler;

pub use scheduler::{PhaseTimer, Scheduler, SchedulerHandle};

use crate::config::Config;
use crate::model::{Language, Phase};
use crate::storage::{RunStatus, Storage, StorageError, StorageResult};
use crate::upstream::{UpstreamClient, UpstreamError};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Tunables of the crawl engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Stored repositories older than this are re-checked by Refresh
    pub refresh_after: Duration,

    /// Stored repositories older than this are deleted by Prune
    pub prune_after: Duration,

    /// Hash of the configuration file, recorded on every run
    pub config_hash: String,
}

impl EngineSettings {
    pub fn from_config(config: &Config, config_hash: impl Into<String>) -> Self {
        Self {
            refresh_after: saturating_age(config.storage.refresh_after_mins, Duration::try_minutes),
            prune_after: saturating_age(config.storage.prune_after_hours, Duration::try_hours),
            config_hash: config_hash.into(),
        }
    }
}

/// Converts a configured age, clamping values chrono cannot represent
fn saturating_age(value: u64, unit: fn(i64) -> Option<Duration>) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(unit)
        .unwrap_or(Duration::MAX)
}

/// The instant `age` before now
///
/// An age reaching past the earliest representable instant yields that
/// instant, so nothing counts as older than it.
pub(crate) fn cutoff_before_now(age: Duration) -> DateTime<Utc> {
    Utc::now()
        .checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            refresh_after: Duration::minutes(120),
            prune_after: Duration::hours(72),
            config_hash: String::new(),
        }
    }
}

/// Counters collected during one phase run
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Languages finished (and checkpointed) in this run
    pub languages_completed: usize,
    /// Languages skipped because they were already complete this cycle
    pub languages_skipped: usize,
    /// Languages left incomplete after a non-rate-limit failure
    pub languages_deferred: usize,
    pub repos_stored: usize,
    pub repos_updated: usize,
    pub repos_deleted: usize,
    pub repos_skipped: usize,
    pub issues_stored: usize,
    pub issues_dropped: usize,
    /// Issues kept unchanged because their re-fetch failed
    pub issues_preserved: usize,
    pub rate_limited: bool,
    /// Whether the run finished the cycle and cleared all checkpoints
    pub cycle_reset: bool,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            languages_completed: 0,
            languages_skipped: 0,
            languages_deferred: 0,
            repos_stored: 0,
            repos_updated: 0,
            repos_deleted: 0,
            repos_skipped: 0,
            issues_stored: 0,
            issues_dropped: 0,
            issues_preserved: 0,
            rate_limited: false,
            cycle_reset: false,
        }
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: languages {} completed / {} skipped / {} deferred, repos {} stored / {} updated / {} deleted / {} skipped, issues {} stored / {} dropped / {} preserved",
            self.phase,
            self.languages_completed,
            self.languages_skipped,
            self.languages_deferred,
            self.repos_stored,
            self.repos_updated,
            self.repos_deleted,
            self.repos_skipped,
            self.issues_stored,
            self.issues_dropped,
            self.issues_preserved,
        )?;
        if self.rate_limited {
            write!(f, " (aborted on rate limit)")?;
        } else if self.cycle_reset {
            write!(f, " (cycle complete)")?;
        }
        Ok(())
    }
}

/// Result of asking the engine to run a phase
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    /// Every language was processed; checkpoints were reset for the next cycle
    Completed(PhaseReport),

    /// A rate limit aborted the run; checkpoints were left for the next run
    RateLimited(PhaseReport),

    /// A previous run of the same phase was still active
    Skipped,
}

impl PhaseOutcome {
    pub fn report(&self) -> Option<&PhaseReport> {
        match self {
            Self::Completed(report) | Self::RateLimited(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

/// How processing of one language ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LanguageOutcome {
    /// All work for the language is done; it can be checkpointed
    Finished,

    /// The language could not be processed this time; retry next run
    Deferred,

    /// A rate limit was hit; abort the run
    RateLimited,
}

/// Marks a phase as running until dropped
struct PhaseGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PhaseGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs crawl phases against an upstream client and a storage backend
pub struct CrawlEngine<S, U> {
    storage: Arc<Mutex<S>>,
    upstream: Arc<U>,
    settings: EngineSettings,
    running: [AtomicBool; 3],
}

impl<S, U> CrawlEngine<S, U>
where
    S: Storage + Send,
    U: UpstreamClient,
{
    /// Creates a new engine
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared storage backend
    /// * `upstream` - Upstream API client
    /// * `settings` - Staleness thresholds and the config hash
    pub fn new(storage: Arc<Mutex<S>>, upstream: Arc<U>, settings: EngineSettings) -> Self {
        Self {
            storage,
            upstream,
            settings,
            running: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        }
    }

    pub fn storage(&self) -> &Arc<Mutex<S>> {
        &self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Returns true while a run of the phase is in progress
    pub fn is_running(&self, phase: Phase) -> bool {
        self.running[phase.index()].load(Ordering::Acquire)
    }

    /// Runs one phase to completion or until a rate limit aborts it
    ///
    /// If a run of the same phase is already in progress, returns
    /// [`PhaseOutcome::Skipped`] without doing anything. Every other invocation
    /// is recorded in the run log.
    ///
    /// # Errors
    ///
    /// Storage failures and unreadable upstream timestamps abort the run and are
    /// returned; the run is recorded as failed.
    pub async fn run_phase(&self, phase: Phase) -> Result<PhaseOutcome> {
        let Some(_guard) = PhaseGuard::acquire(&self.running[phase.index()]) else {
            tracing::warn!("Previous {} run is still active, skipping this invocation", phase);
            return Ok(PhaseOutcome::Skipped);
        };

        let run_id = self.with_storage(|s| s.create_run(phase, &self.settings.config_hash))?;
        tracing::info!("Starting {} run {}", phase, run_id);

        let result = match phase {
            Phase::Ingest => self.run_checkpointed(Checkpointed::Ingest).await,
            Phase::Refresh => self.run_checkpointed(Checkpointed::Refresh).await,
            Phase::Prune => self.prune(),
        };

        let status = match &result {
            Ok(report) if report.rate_limited => RunStatus::RateLimited,
            Ok(_) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        };
        if let Err(e) = self.with_storage(|s| s.finish_run(run_id, status)) {
            tracing::warn!("Failed to record end of {} run {}: {}", phase, run_id, e);
        }

        let report = result?;
        tracing::info!("Finished {} run {}: {}", phase, run_id, report);

        Ok(if report.rate_limited {
            PhaseOutcome::RateLimited(report)
        } else {
            PhaseOutcome::Completed(report)
        })
    }

    /// Runs a checkpointed phase over every tracked language
    ///
    /// Languages already complete this cycle are skipped. A language is marked
    /// complete only when it finished without a rate limit, and the cycle is
    /// reset only when no rate limit occurred anywhere in the run.
    async fn run_checkpointed(&self, checkpointed: Checkpointed) -> Result<PhaseReport> {
        let phase = checkpointed.phase();
        let mut report = PhaseReport::new(phase);

        let languages = self.with_storage(|s| s.list_languages())?;
        if languages.is_empty() {
            tracing::info!("No tracked languages, nothing to {}", phase);
            return Ok(report);
        }

        for language in &languages {
            if let Some(completed_at) = self.with_storage(|s| s.get_job(phase, language.id))? {
                tracing::debug!(
                    "{} already completed for {} at {}",
                    phase,
                    language,
                    completed_at
                );
                report.languages_skipped += 1;
                continue;
            }

            tracing::info!("{}: processing {}", phase, language);

            let outcome = match checkpointed {
                Checkpointed::Ingest => self.ingest_language(language, &mut report).await?,
                Checkpointed::Refresh => self.refresh_language(language, &mut report).await?,
            };

            match outcome {
                LanguageOutcome::Finished => {
                    self.with_storage(|s| s.mark_complete(phase, language.id, Utc::now()))?;
                    report.languages_completed += 1;
                }
                LanguageOutcome::Deferred => {
                    report.languages_deferred += 1;
                }
                LanguageOutcome::RateLimited => {
                    report.rate_limited = true;
                    break;
                }
            }
        }

        if !report.rate_limited {
            self.with_storage(|s| s.reset_all(phase))?;
            report.cycle_reset = true;
            tracing::info!("{} cycle complete, checkpoints reset", phase);
        }

        Ok(report)
    }

    /// Runs a closure against the locked storage
    ///
    /// The lock is released before returning, so callers never hold it across
    /// an `.await`.
    fn with_storage<T>(&self, f: impl FnOnce(&mut S) -> StorageResult<T>) -> Result<T> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&mut storage)?)
    }
}

/// The phases that keep per-language checkpoints
#[derive(Debug, Clone, Copy)]
enum Checkpointed {
    Ingest,
    Refresh,
}

impl Checkpointed {
    fn phase(self) -> Phase {
        match self {
            Checkpointed::Ingest => Phase::Ingest,
            Checkpointed::Refresh => Phase::Refresh,
        }
    }
}

/// Logs a rate-limit abort
fn log_rate_limit(phase: Phase, language: &Language, error: &UpstreamError) {
    match error {
        UpstreamError::RateLimited {
            reset_at: Some(reset_at),
        } => tracing::info!(
            "{} of {} hit the rate limit (resets at {}), aborting run",
            phase,
            language,
            reset_at
        ),
        other => tracing::info!("{} of {}: {}, aborting run", phase, language, other),
    }
}
