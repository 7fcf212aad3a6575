//! Statistics generation from the mirror database
//!
//! This module provides functionality for extracting and displaying
//! mirror statistics from the storage layer.

use crate::model::{Language, Phase};
use crate::storage::{RunRecord, Storage};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Number of runs shown by default
pub const RECENT_RUN_LIMIT: usize = 10;

/// Mirror statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Per-language counts, in tracking order
    pub languages: Vec<LanguageStatistics>,

    /// Most recent phase runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

impl HarvestStatistics {
    pub fn total_repos(&self) -> u64 {
        self.languages.iter().map(|l| l.repos).sum()
    }

    pub fn total_issues(&self) -> u64 {
        self.languages.iter().map(|l| l.issues).sum()
    }
}

/// Counts and checkpoints of one tracked language
#[derive(Debug, Clone)]
pub struct LanguageStatistics {
    pub language: Language,
    pub repos: u64,
    pub issues: u64,

    /// Completion time of each checkpointed phase in the current cycle
    pub completed: BTreeMap<Phase, DateTime<Utc>>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `run_limit` - How many recent runs to include
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    run_limit: usize,
) -> Result<HarvestStatistics, HarvestError> {
    let jobs = storage.list_jobs()?;

    let mut languages = Vec::new();
    for language in storage.list_languages()? {
        let completed = jobs
            .iter()
            .filter(|job| job.language_id == language.id)
            .filter_map(|job| job.completed_at.map(|at| (job.phase, at)))
            .collect();

        languages.push(LanguageStatistics {
            repos: storage.count_repos(language.id)?,
            issues: storage.count_issues(language.id)?,
            completed,
            language,
        });
    }

    let recent_runs = storage.recent_runs(run_limit)?;

    Ok(HarvestStatistics {
        languages,
        recent_runs,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Tracked languages: {}", stats.languages.len());
    println!("  Stored repositories: {}", stats.total_repos());
    println!("  Stored open issues: {}", stats.total_issues());
    println!();

    println!("Languages:");
    for entry in &stats.languages {
        println!(
            "  {}: {} repositories, {} issues",
            entry.language, entry.repos, entry.issues
        );
        for phase in Phase::ALL.iter().filter(|p| p.is_checkpointed()) {
            match entry.completed.get(phase) {
                Some(at) => println!("    {} done this cycle at {}", phase, at.to_rfc3339()),
                None => println!("    {} pending", phase),
            }
        }
    }
    println!();

    if !stats.recent_runs.is_empty() {
        println!("Recent Runs ({}):", stats.recent_runs.len());
        for run in &stats.recent_runs {
            println!(
                "  #{} {} started {} finished {} [{}]",
                run.id,
                run.phase,
                run.started_at,
                run.finished_at.as_deref().unwrap_or("-"),
                run.status.to_db_string()
            );
        }
    }
}
