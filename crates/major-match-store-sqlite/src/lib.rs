use std::path::Path;

use anyhow::{anyhow, Context, Result};
use major_match_core::{QuizError, ResultId, ResultStore, TestResult};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS test_results (
  id TEXT PRIMARY KEY CHECK (length(id) = 8),
  personality TEXT NOT NULL,
  top_department_id INTEGER,
  created_at TEXT NOT NULL,
  created_at_unix_ns INTEGER NOT NULL,
  expires_at TEXT,
  result_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_results_created_at ON test_results(created_at_unix_ns);
";

const MIGRATION_002_SQL: &str = r"
ALTER TABLE test_results ADD COLUMN expires_at_unix_ns INTEGER;
CREATE INDEX IF NOT EXISTS idx_test_results_expires_at ON test_results(expires_at_unix_ns);
";

/// `SQLite`-backed [`ResultStore`] with versioned schema migrations.
pub struct SqliteResultStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultStats {
    pub total_results: u64,
    pub active_results: u64,
    pub expired_results: u64,
    pub last_created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub undecodable_result_ids: Vec<String>,
    pub schema_status: SchemaStatus,
}

impl SqliteResultStore {
    /// Open a result database and configure runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let (current_version, inferred_from_legacy) = detect_effective_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
            inferred_from_legacy,
        })
    }

    /// Apply all forward migrations up to the latest schema version.
    ///
    /// Runs under an immediate write transaction; the version is re-read once
    /// the lock is held.
    ///
    /// # Errors
    /// Returns an error when bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        if table_exists(&self.conn, "schema_migrations")?
            && current_schema_version(&self.conn)? == LATEST_SCHEMA_VERSION
        {
            return Ok(());
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to acquire migration lock")?;
        tx.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&tx)?;
        if version == 0 {
            version = bootstrap_schema_version(&tx)?;
        }

        if version < 2 {
            apply_migration_2(&tx)?;
            version = current_schema_version(&tx)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        tx.commit().context("failed to commit schema migrations")?;
        Ok(())
    }

    /// Insert a result unless its id is taken.
    ///
    /// Returns `false` when a row with the same id already exists.
    ///
    /// # Errors
    /// Returns an error when serialization or the insert fails.
    pub fn insert_result(&self, result: &TestResult) -> Result<bool> {
        let result_json =
            serde_json::to_string(result).context("failed to serialize test result")?;
        let inserted = self
            .conn
            .execute(
                "INSERT INTO test_results(
                    id, personality, top_department_id, created_at, created_at_unix_ns,
                    expires_at, expires_at_unix_ns, result_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO NOTHING",
                params![
                    result.id.as_str(),
                    result.personality.as_str(),
                    result.top_departments.first().map(|entry| entry.department.id),
                    rfc3339(result.created_at)?,
                    unix_ns(result.created_at)?,
                    result.expires_at.map(rfc3339).transpose()?,
                    result.expires_at.map(unix_ns).transpose()?,
                    result_json,
                ],
            )
            .with_context(|| format!("failed to insert test result {}", result.id))?;
        Ok(inserted == 1)
    }

    /// Load a stored result regardless of expiry.
    ///
    /// # Errors
    /// Returns an error when the lookup or JSON decoding fails.
    pub fn load_result(&self, id: &ResultId) -> Result<Option<TestResult>> {
        let value = self
            .conn
            .query_row(
                "SELECT result_json FROM test_results WHERE id = ?1",
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to look up test result {id}"))?;

        value
            .map(|json| {
                serde_json::from_str(&json)
                    .with_context(|| format!("failed to deserialize stored test result {id}"))
            })
            .transpose()
    }

    /// Remove a result row. Returns whether a row was deleted.
    ///
    /// # Errors
    /// Returns an error when the delete statement fails.
    pub fn remove_result(&self, id: &ResultId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM test_results WHERE id = ?1", params![id.as_str()])
            .with_context(|| format!("failed to delete test result {id}"))?;
        Ok(deleted == 1)
    }

    /// Count stored results, split by expiry at `now`.
    ///
    /// # Errors
    /// Returns an error when the aggregate queries fail.
    pub fn stats(&self, now: OffsetDateTime) -> Result<ResultStats> {
        let now_ns = unix_ns(now)?;
        let (total, active) = self
            .conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN expires_at_unix_ns IS NULL OR expires_at_unix_ns > ?1
                                          THEN 1 ELSE 0 END), 0)
                 FROM test_results",
                params![now_ns],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .context("failed to count test results")?;

        let last_created_at = self
            .conn
            .query_row(
                "SELECT created_at FROM test_results ORDER BY created_at_unix_ns DESC, id DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("failed to read latest test result timestamp")?;

        let total_results = u64::try_from(total).context("negative result count")?;
        let active_results = u64::try_from(active).context("negative active result count")?;
        Ok(ResultStats {
            total_results,
            active_results,
            expired_results: total_results.saturating_sub(active_results),
            last_created_at,
        })
    }

    /// Delete every result whose expiry is at or before `now`.
    ///
    /// # Errors
    /// Returns an error when the delete statement fails.
    pub fn purge_expired(&mut self, now: OffsetDateTime) -> Result<usize> {
        let purged = self
            .conn
            .execute(
                "DELETE FROM test_results
                 WHERE expires_at_unix_ns IS NOT NULL AND expires_at_unix_ns <= ?1",
                params![unix_ns(now)?],
            )
            .context("failed to purge expired test results")?;
        if purged > 0 {
            info!(purged, "purged expired test results");
        }
        Ok(purged)
    }

    /// Run quick-check, result decoding, and schema status health checks.
    ///
    /// # Errors
    /// Returns an error when any check query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let mut undecodable_result_ids = Vec::new();
        if table_exists(&self.conn, "test_results")? {
            let mut stmt = self
                .conn
                .prepare("SELECT id, result_json FROM test_results ORDER BY id")
                .context("failed to prepare result decoding check")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                let (id, json) = row?;
                if serde_json::from_str::<TestResult>(&json).is_err() {
                    warn!(result_id = %id, "stored test result does not decode");
                    undecodable_result_ids.push(id);
                }
            }
        }

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            undecodable_result_ids,
            schema_status,
        })
    }
}

impl ResultStore for SqliteResultStore {
    fn put(&mut self, result: &TestResult) -> Result<(), QuizError> {
        if self.insert_result(result).map_err(storage_error)? {
            debug!(result_id = %result.id, "persisted test result");
            Ok(())
        } else {
            Err(QuizError::Conflict(format!("result {} already exists", result.id)))
        }
    }

    fn get(&self, id: &ResultId, now: OffsetDateTime) -> Result<TestResult, QuizError> {
        self.load_result(id)
            .map_err(storage_error)?
            .filter(|result| !result.is_expired(now))
            .ok_or_else(|| QuizError::NotFound(format!("result {id} not found")))
    }

    fn delete(&mut self, id: &ResultId) -> Result<(), QuizError> {
        if self.remove_result(id).map_err(storage_error)? {
            Ok(())
        } else {
            Err(QuizError::NotFound(format!("result {id} not found")))
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn storage_error(err: anyhow::Error) -> QuizError {
    QuizError::Storage(format!("{err:#}"))
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("failed to inspect table_info for {table}"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
        row.get::<_, i64>(0)
    })
    .context("failed to read current schema version")
}

fn detect_effective_schema_version(conn: &Connection) -> Result<(i64, bool)> {
    let recorded = current_schema_version(conn)?;
    if recorded > 0 {
        return Ok((recorded, false));
    }
    if !table_exists(conn, "test_results")? {
        return Ok((0, false));
    }
    if table_has_column(conn, "test_results", "expires_at_unix_ns")? {
        return Ok((2, true));
    }
    if table_has_column(conn, "test_results", "result_json")? {
        return Ok((1, true));
    }
    Err(anyhow!("database schema is invalid: test_results has no result_json column"))
}

fn bootstrap_schema_version(conn: &Connection) -> Result<i64> {
    if !table_exists(conn, "test_results")? {
        conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
        record_schema_version(conn, 1)?;
        info!(version = 1, "applied result store migration");
        return Ok(1);
    }

    // Tables exist without migration bookkeeping.
    record_schema_version(conn, 1)?;
    if table_has_column(conn, "test_results", "expires_at_unix_ns")? {
        record_schema_version(conn, 2)?;
        return Ok(2);
    }
    Ok(1)
}

fn apply_migration_2(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_002_SQL).context("failed to apply migration v2")?;

    let expiring = {
        let mut stmt = conn
            .prepare("SELECT id, expires_at FROM test_results WHERE expires_at IS NOT NULL")
            .context("failed to prepare expiry backfill query")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read expiry timestamps for backfill")?
    };

    for (id, expires_at) in &expiring {
        let expires_at_unix_ns = unix_ns(parse_rfc3339(expires_at)?)?;
        conn.execute(
            "UPDATE test_results SET expires_at_unix_ns = ?1 WHERE id = ?2",
            params![expires_at_unix_ns, id],
        )
        .with_context(|| format!("failed to backfill expiry for result {id}"))?;
    }

    record_schema_version(conn, 2)?;
    info!(version = 2, backfilled = expiring.len(), "applied result store migration");
    Ok(())
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now_rfc3339()?],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

fn unix_ns(value: OffsetDateTime) -> Result<i64> {
    i64::try_from(value.unix_timestamp_nanos())
        .with_context(|| format!("timestamp out of storable range: {value}"))
}
