//! Domain model for the mirrored data
//!
//! # Components
//!
//! - `Language`: a tracked programming language
//! - `Phase`: the three recurring crawl operations (ingest, refresh, prune)
//! - `Repo` / `Issue`: mirrored repository metadata and the open issues it owns

mod phase;
mod repo;

// Re-export main types
pub use phase::Phase;
pub use repo::{Issue, Repo};

use std::fmt;

/// A tracked programming language
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Language {
    pub id: i64,
    pub name: String,
}

impl Language {
    /// Returns true if an upstream language name refers to this language
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
