//! Configuration module for Issue-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use issue_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Tracking {} languages", config.languages.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, GitHubConfig, LanguageEntry, PhaseSchedule, ScheduleConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
