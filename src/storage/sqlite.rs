//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::model::{Issue, Language, Phase, Repo};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    JobTracker, LanguageSource, RepoStore, RunLog, StorageError, StorageResult,
};
use crate::storage::{JobRecord, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::BTreeMap;
use std::path::Path;

const REPO_COLUMNS: &str = "repo_id, language_id, is_public, is_archived, is_template, \
     is_disabled, name, full_name, description, html_url, url, forks_count, stargazers_count, \
     watchers_count, pushed_at, created_at, updated_at, refreshed_at";

const ISSUE_COLUMNS: &str = "issue_id, number, title, html_url, url, is_locked, \
     comments_count, created_at, updated_at, closed_at";

const REPO_UPSERT_SQL: &str = "INSERT INTO repos (repo_id, language_id, is_public, is_archived, \
     is_template, is_disabled, name, full_name, description, html_url, url, forks_count, \
     stargazers_count, watchers_count, pushed_at, created_at, updated_at, refreshed_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
     ON CONFLICT(repo_id) DO UPDATE SET
        language_id = excluded.language_id, is_public = excluded.is_public,
        is_archived = excluded.is_archived, is_template = excluded.is_template,
        is_disabled = excluded.is_disabled, name = excluded.name,
        full_name = excluded.full_name, description = excluded.description,
        html_url = excluded.html_url, url = excluded.url,
        forks_count = excluded.forks_count, stargazers_count = excluded.stargazers_count,
        watchers_count = excluded.watchers_count, pushed_at = excluded.pushed_at,
        created_at = excluded.created_at, updated_at = excluded.updated_at,
        refreshed_at = excluded.refreshed_at";

const REPO_UPDATE_SQL: &str = "UPDATE repos SET language_id = ?2, is_public = ?3, \
     is_archived = ?4, is_template = ?5, is_disabled = ?6, name = ?7, full_name = ?8, \
     description = ?9, html_url = ?10, url = ?11, forks_count = ?12, stargazers_count = ?13, \
     watchers_count = ?14, pushed_at = ?15, created_at = ?16, updated_at = ?17, \
     refreshed_at = ?18
     WHERE repo_id = ?1";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_repos(&self, sql: &str, language_id: i64, cutoff: &str) -> StorageResult<Vec<Repo>> {
        let mut stmt = self.conn.prepare(sql)?;
        let repos = stmt
            .query_map(params![language_id, cutoff], row_to_repo)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    fn load_issues(&self, repo_id: i64, open_only: bool) -> StorageResult<Vec<Issue>> {
        let filter = if open_only {
            " AND closed_at IS NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM issues WHERE repo_id = ?1{} ORDER BY issue_id",
            ISSUE_COLUMNS, filter
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let issues = stmt
            .query_map(params![repo_id], row_to_issue)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(issues)
    }

    fn write_repo(&mut self, repo: &Repo, sql: &str) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            sql,
            params![
                repo.repo_id,
                repo.language_id,
                repo.is_public,
                repo.is_archived,
                repo.is_template,
                repo.is_disabled,
                repo.name,
                repo.full_name,
                repo.description,
                repo.html_url,
                repo.url,
                repo.forks_count,
                repo.stargazers_count,
                repo.watchers_count,
                repo.pushed_at.as_ref().map(to_db_time),
                to_db_time(&repo.created_at),
                to_db_time(&repo.updated_at),
                to_db_time(&repo.refreshed_at),
            ],
        )?;

        if changed > 0 {
            replace_issues(&tx, repo)?;
            tx.commit()?;
        }

        Ok(changed)
    }
}

impl LanguageSource for SqliteStorage {
    fn list_languages(&self) -> StorageResult<Vec<Language>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM languages WHERE active = 1 ORDER BY id")?;

        let languages = stmt
            .query_map([], |row| {
                Ok(Language {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(languages)
    }

    fn sync_languages(&mut self, names: &[String]) -> StorageResult<Vec<Language>> {
        let tx = self.conn.transaction()?;
        tx.execute("UPDATE languages SET active = 0", [])?;
        for name in names {
            let name = name.trim();
            tx.execute(
                "INSERT INTO languages (name, active) VALUES (?1, 1)
                 ON CONFLICT(name) DO UPDATE SET active = 1",
                params![name],
            )?;
        }
        tx.commit()?;

        self.list_languages()
    }
}

impl JobTracker for SqliteStorage {
    fn get_job(&self, phase: Phase, language_id: i64) -> StorageResult<Option<DateTime<Utc>>> {
        let completed_at: Option<String> = self
            .conn
            .query_row(
                "SELECT completed_at FROM jobs WHERE phase = ?1 AND language_id = ?2",
                params![phase.to_db_string(), language_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        completed_at
            .map(|s| parse_db_time(&s, "completed_at"))
            .transpose()
    }

    fn mark_complete(
        &mut self,
        phase: Phase,
        language_id: i64,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO jobs (phase, language_id, completed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(phase, language_id) DO UPDATE SET completed_at = excluded.completed_at",
            params![
                phase.to_db_string(),
                language_id,
                to_db_time(&completed_at)
            ],
        )?;
        Ok(())
    }

    fn reset_all(&mut self, phase: Phase) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE jobs SET completed_at = NULL WHERE phase = ?1",
            params![phase.to_db_string()],
        )?;
        Ok(())
    }

    fn list_jobs(&self) -> StorageResult<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT phase, language_id, completed_at FROM jobs ORDER BY phase, language_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(phase, language_id, completed_at)| {
                let phase = Phase::from_db_string(&phase).ok_or(StorageError::CorruptValue {
                    column: "jobs.phase",
                    value: phase.clone(),
                })?;
                let completed_at = completed_at
                    .map(|s| parse_db_time(&s, "jobs.completed_at"))
                    .transpose()?;
                Ok(JobRecord {
                    phase,
                    language_id,
                    completed_at,
                })
            })
            .collect()
    }
}

impl RepoStore for SqliteStorage {
    fn upsert_repo(&mut self, repo: &Repo) -> StorageResult<()> {
        self.write_repo(repo, REPO_UPSERT_SQL)?;
        Ok(())
    }

    fn save_repo(&mut self, repo: &Repo) -> StorageResult<()> {
        if self.write_repo(repo, REPO_UPDATE_SQL)? == 0 {
            return Err(StorageError::RepoNotFound(repo.repo_id));
        }
        Ok(())
    }

    fn delete_repo(&mut self, repo_id: i64) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM issues WHERE repo_id = ?1", params![repo_id])?;
        let deleted = tx.execute("DELETE FROM repos WHERE repo_id = ?1", params![repo_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn get_repo(&self, repo_id: i64) -> StorageResult<Option<Repo>> {
        let sql = format!("SELECT {} FROM repos WHERE repo_id = ?1", REPO_COLUMNS);
        let repo = self
            .conn
            .query_row(&sql, params![repo_id], row_to_repo)
            .optional()?;

        match repo {
            Some(mut repo) => {
                repo.set_issues(self.load_issues(repo_id, false)?);
                Ok(Some(repo))
            }
            None => Ok(None),
        }
    }

    fn list_repos_pending_refresh(
        &self,
        language_id: i64,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<Repo>> {
        let sql = format!(
            "SELECT {} FROM repos WHERE language_id = ?1 AND refreshed_at <= ?2
             ORDER BY refreshed_at, repo_id",
            REPO_COLUMNS
        );
        self.query_repos(&sql, language_id, &to_db_time(&cutoff))
    }

    fn list_repos_pending_prune(
        &self,
        language_id: i64,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<Repo>> {
        let sql = format!(
            "SELECT {} FROM repos WHERE language_id = ?1
             AND (refreshed_at <= ?2
                  OR NOT EXISTS (SELECT 1 FROM issues WHERE issues.repo_id = repos.repo_id))
             ORDER BY repo_id",
            REPO_COLUMNS
        );
        self.query_repos(&sql, language_id, &to_db_time(&cutoff))
    }

    fn list_open_issues(&self, repo_id: i64) -> StorageResult<Vec<Issue>> {
        self.load_issues(repo_id, true)
    }

    fn count_repos(&self, language_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM repos WHERE language_id = ?1",
            params![language_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_issues(&self, language_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM issues
             JOIN repos ON repos.repo_id = issues.repo_id
             WHERE repos.language_id = ?1",
            params![language_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl RunLog for SqliteStorage {
    fn create_run(&mut self, phase: Phase, config_hash: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (phase, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                phase.to_db_string(),
                to_db_time(&Utc::now()),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), to_db_time(&Utc::now()), run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn mark_interrupted_runs(&mut self) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE status = ?3",
            params![
                RunStatus::Interrupted.to_db_string(),
                to_db_time(&Utc::now()),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phase, started_at, finished_at, config_hash, status
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, phase, started_at, finished_at, config_hash, status)| {
                Ok(RunRecord {
                    id,
                    phase: Phase::from_db_string(&phase).ok_or(StorageError::CorruptValue {
                        column: "runs.phase",
                        value: phase.clone(),
                    })?,
                    started_at,
                    finished_at,
                    config_hash,
                    status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Failed),
                })
            })
            .collect()
    }
}

/// Replaces all stored issues of a repository with the repository's current set
fn replace_issues(tx: &Transaction<'_>, repo: &Repo) -> rusqlite::Result<()> {
    tx.execute("DELETE FROM issues WHERE repo_id = ?1", params![repo.repo_id])?;

    let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO issues (issue_id, repo_id, number, title, html_url, url,
         is_locked, comments_count, created_at, updated_at, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    for issue in repo.issues.values() {
        stmt.execute(params![
            issue.issue_id,
            repo.repo_id,
            issue.number,
            issue.title,
            issue.html_url,
            issue.url,
            issue.is_locked,
            issue.comments_count,
            to_db_time(&issue.created_at),
            to_db_time(&issue.updated_at),
            issue.closed_at.as_ref().map(to_db_time),
        ])?;
    }

    Ok(())
}

fn row_to_repo(row: &Row<'_>) -> rusqlite::Result<Repo> {
    Ok(Repo {
        repo_id: row.get(0)?,
        language_id: row.get(1)?,
        is_public: row.get(2)?,
        is_archived: row.get(3)?,
        is_template: row.get(4)?,
        is_disabled: row.get(5)?,
        name: row.get(6)?,
        full_name: row.get(7)?,
        description: row.get(8)?,
        html_url: row.get(9)?,
        url: row.get(10)?,
        forks_count: row.get(11)?,
        stargazers_count: row.get(12)?,
        watchers_count: row.get(13)?,
        pushed_at: optional_time_column(row, 14)?,
        created_at: time_column(row, 15)?,
        updated_at: time_column(row, 16)?,
        refreshed_at: time_column(row, 17)?,
        issues: BTreeMap::new(),
    })
}

fn row_to_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        issue_id: row.get(0)?,
        number: row.get(1)?,
        title: row.get(2)?,
        html_url: row.get(3)?,
        url: row.get(4)?,
        is_locked: row.get(5)?,
        comments_count: row.get(6)?,
        created_at: time_column(row, 7)?,
        updated_at: time_column(row, 8)?,
        closed_at: optional_time_column(row, 9)?,
    })
}

fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_db_time(value: &str, column: &'static str) -> StorageResult<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|_| StorageError::CorruptValue {
            column,
            value: value.to_string(),
        })
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    value
        .parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|v| {
            v.parse::<DateTime<Utc>>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}
