//! Storage module for persisting the mirror
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Tracked language persistence
//! - Per-phase, per-language job checkpoints
//! - Repository and issue persistence
//! - Run tracking for phase invocations

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    JobTracker, LanguageSource, RepoStore, RunLog, Storage, StorageError, StorageResult,
};

use crate::model::Phase;
use crate::HarvestError;
use chrono::{DateTime, Utc};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// A job checkpoint row
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub phase: Phase,
    pub language_id: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Represents a phase run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub phase: Phase,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    RateLimited,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::RateLimited => "rate_limited",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "rate_limited" => Some(Self::RateLimited),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
