//! Crawl phase definitions
//!
//! A phase is one of the three recurring operations the scheduler drives.

use std::fmt;
use std::str::FromStr;

/// One of the three recurring crawl operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Discover new repositories for every tracked language
    Ingest,

    /// Re-check stored repositories and their open issues against upstream
    Refresh,

    /// Delete stale repositories from local storage
    Prune,
}

impl Phase {
    /// All phases in scheduling order
    pub const ALL: [Phase; 3] = [Phase::Ingest, Phase::Refresh, Phase::Prune];

    /// Returns true if this phase keeps per-language completion checkpoints
    ///
    /// Prune only touches local storage, so it always runs to completion and
    /// never needs to resume.
    pub fn is_checkpointed(&self) -> bool {
        !matches!(self, Self::Prune)
    }

    /// Position of this phase in [`Phase::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Self::Ingest => 0,
            Self::Refresh => 1,
            Self::Prune => 2,
        }
    }

    /// Converts the phase to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Refresh => "refresh",
            Self::Prune => "prune",
        }
    }

    /// Parses a phase from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "ingest" => Some(Self::Ingest),
            "refresh" => Some(Self::Refresh),
            "prune" => Some(Self::Prune),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown phase '{}', expected ingest, refresh or prune", s))
    }
}
