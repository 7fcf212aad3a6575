//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Issue-Harvest database.
//! Timestamps are stored as RFC 3339 UTC text with millisecond precision so that
//! text comparison orders them chronologically.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Tracked languages
CREATE TABLE IF NOT EXISTS languages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    active INTEGER NOT NULL DEFAULT 1
);

-- Per phase, per language completion checkpoints
CREATE TABLE IF NOT EXISTS jobs (
    phase TEXT NOT NULL,
    language_id INTEGER NOT NULL REFERENCES languages(id),
    completed_at TEXT,
    PRIMARY KEY (phase, language_id)
);

-- Mirrored repositories
CREATE TABLE IF NOT EXISTS repos (
    repo_id INTEGER PRIMARY KEY,
    language_id INTEGER NOT NULL REFERENCES languages(id),
    is_public INTEGER NOT NULL,
    is_archived INTEGER NOT NULL,
    is_template INTEGER NOT NULL,
    is_disabled INTEGER NOT NULL,
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    description TEXT,
    html_url TEXT NOT NULL,
    url TEXT NOT NULL,
    forks_count INTEGER NOT NULL DEFAULT 0,
    stargazers_count INTEGER NOT NULL DEFAULT 0,
    watchers_count INTEGER NOT NULL DEFAULT 0,
    pushed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    refreshed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_repos_language ON repos(language_id, refreshed_at);

-- Open issues, owned by their repository
CREATE TABLE IF NOT EXISTS issues (
    issue_id INTEGER PRIMARY KEY,
    repo_id INTEGER NOT NULL REFERENCES repos(repo_id) ON DELETE CASCADE,
    number INTEGER NOT NULL,
    title TEXT NOT NULL,
    html_url TEXT NOT NULL,
    url TEXT NOT NULL,
    is_locked INTEGER NOT NULL,
    comments_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    closed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_issues_repo ON issues(repo_id);

-- Phase run history
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phase TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
