use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration text
///
/// ```
/// use issue_harvest::config::parse_config;
///
/// let config = parse_config(
///     "[storage]\ndatabase-path = \"harvest.db\"\n\n[[language]]\nname = \"Go\"\n",
/// )
/// .unwrap();
/// assert_eq!(config.languages[0].name, "Go");
/// ```
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Reads, parses and validates the configuration file at `path`
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Hex-encoded SHA-256 of the configuration file at `path`
///
/// The hash is recorded on every phase run so runs can be traced back to the
/// configuration they were started with.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&std::fs::read_to_string(path)?))
}

/// Loads a configuration together with its hash
///
/// The file is read once, so the hash always describes the text that was
/// parsed even if the file changes on disk meanwhile.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
