use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::info;

use driftwatch_common::DriftwatchError;

use crate::record::{CycleCompletion, CycleRecord, CycleStatus};

/// Durable single-writer record of cycle attempts, backed by an embedded
/// SQLite file. Construction failure is fatal: the scheduler refuses to
/// start without its history.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (or create) the history database and ensure the schema exists.
    /// The containing directory is created if missing.
    pub async fn open(path: &Path) -> Result<Self, DriftwatchError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DriftwatchError::Config(format!(
                        "cannot create history directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| DriftwatchError::Config(format!("cannot open history database: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "History store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), DriftwatchError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_history (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                scan_session_id  TEXT    NOT NULL UNIQUE,
                target_source    TEXT    NOT NULL,
                num_targets      INTEGER NOT NULL,
                scan_start_time  TEXT    NOT NULL,
                scan_end_time    TEXT,
                status           TEXT    NOT NULL,
                log_summary      TEXT,
                report_file_path TEXT,
                new_urls         INTEGER NOT NULL DEFAULT 0,
                old_urls         INTEGER NOT NULL DEFAULT 0,
                existing_urls    INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DriftwatchError::Config(format!("cannot create scan_history schema: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scan_history_status_start
             ON scan_history(status, scan_start_time)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DriftwatchError::Config(format!("cannot create scan_history index: {e}")))?;

        Ok(())
    }

    /// Create the row for a new cycle with status STARTED and no end time.
    /// Fails if the session id is already present.
    pub async fn record_start(
        &self,
        session_id: &str,
        target_source: &str,
        target_count: usize,
        start_time: DateTime<Utc>,
    ) -> Result<i64, DriftwatchError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO scan_history
                (scan_session_id, target_source, num_targets, scan_start_time, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id
            "#,
        )
        .bind(session_id)
        .bind(target_source)
        .bind(target_count as i64)
        .bind(start_time.to_rfc3339())
        .bind(CycleStatus::Started.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DriftwatchError::History(format!("failed to record scan start for {session_id}: {e}"))
        })?;

        Ok(id)
    }

    /// Close out a cycle row with its terminal status and aggregates.
    /// Last write wins; callers invoke this at most once per cycle.
    pub async fn record_completion(
        &self,
        cycle_id: i64,
        completion: CycleCompletion,
    ) -> Result<(), DriftwatchError> {
        let report = completion
            .report_file_path
            .as_ref()
            .map(|p| p.display().to_string());

        sqlx::query(
            r#"
            UPDATE scan_history
            SET scan_end_time = ?1,
                status = ?2,
                log_summary = ?3,
                new_urls = ?4,
                old_urls = ?5,
                existing_urls = ?6,
                report_file_path = ?7
            WHERE id = ?8
            "#,
        )
        .bind(completion.end_time.to_rfc3339())
        .bind(completion.status.as_str())
        .bind(&completion.log_summary)
        .bind(completion.new_urls)
        .bind(completion.old_urls)
        .bind(completion.existing_urls)
        .bind(report)
        .bind(cycle_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DriftwatchError::History(format!("failed to record completion for cycle {cycle_id}: {e}"))
        })?;

        Ok(())
    }

    /// Start instant of the most recent COMPLETED cycle, if any. The
    /// scheduler derives the next fire time from this.
    pub async fn last_completed_start(&self) -> Result<Option<DateTime<Utc>>, DriftwatchError> {
        let row: Option<String> = sqlx::query_scalar(
            r#"
            SELECT scan_start_time FROM scan_history
            WHERE status = 'COMPLETED'
            ORDER BY scan_start_time DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DriftwatchError::History(format!("failed to query last completed scan: {e}")))?;

        Ok(row.and_then(|s| parse_instant(&s)))
    }

    /// Fetch a single cycle row by id.
    pub async fn get_cycle(&self, cycle_id: i64) -> Result<Option<CycleRecord>, DriftwatchError> {
        let row = sqlx::query("SELECT * FROM scan_history WHERE id = ?1")
            .bind(cycle_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DriftwatchError::History(format!("failed to fetch cycle {cycle_id}: {e}")))?;

        Ok(row.map(|r| record_from_row(&r)))
    }

    /// Most recent cycles, newest first.
    pub async fn recent_cycles(&self, limit: usize) -> Result<Vec<CycleRecord>, DriftwatchError> {
        let rows = sqlx::query(
            "SELECT * FROM scan_history ORDER BY scan_start_time DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DriftwatchError::History(format!("failed to list cycles: {e}")))?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}

fn record_from_row(row: &SqliteRow) -> CycleRecord {
    let status: String = row.get("status");
    let start: String = row.get("scan_start_time");
    let end: Option<String> = row.get("scan_end_time");

    CycleRecord {
        id: row.get("id"),
        scan_session_id: row.get("scan_session_id"),
        target_source: row.get("target_source"),
        num_targets: row.get("num_targets"),
        scan_start_time: parse_instant(&start).unwrap_or_default(),
        scan_end_time: end.as_deref().and_then(parse_instant),
        status: CycleStatus::parse(&status).unwrap_or(CycleStatus::Failed),
        log_summary: row.get("log_summary"),
        report_file_path: row.get("report_file_path"),
        new_urls: row.get("new_urls"),
        old_urls: row.get("old_urls"),
        existing_urls: row.get("existing_urls"),
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
