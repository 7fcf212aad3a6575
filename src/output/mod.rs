//! Output module for reporting on the mirror
//!
//! This module handles loading statistics from storage and printing them for
//! the `--stats` command.

pub mod stats;

pub use stats::{
    load_statistics, print_statistics, HarvestStatistics, LanguageStatistics, RECENT_RUN_LIMIT,
};
