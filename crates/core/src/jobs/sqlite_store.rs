//! SQLite-backed job store.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{ConversionJob, DurationReport, JobFilter, JobStatus, JobStore, JobTransition};
use crate::config::DatabaseConfig;
use crate::database::{
    lock_conn, open_connection, open_in_memory, parse_timestamp, LockRetryPolicy, StoreError,
};

const COLUMNS: &str = "id, catalog_item_id, book_name, source_path, backup_path, status, \
    attempts, max_attempts, started_at, completed_at, error_message, \
    source_total_duration_seconds, converted_duration_seconds, duration_validation_passed, \
    created_at, updated_at";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// SQLite-backed [`JobStore`].
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
    retry: LockRetryPolicy,
}

impl SqliteJobStore {
    /// Open the shared database file and create the table if needed.
    pub fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let conn = open_connection(config)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry: LockRetryPolicy::from_config(&config.lock_retry),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry: LockRetryPolicy::default(),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversion_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                catalog_item_id INTEGER,
                book_name TEXT NOT NULL,
                source_path TEXT NOT NULL,
                backup_path TEXT,
                status TEXT DEFAULT 'pending',
                attempts INTEGER DEFAULT 0,
                max_attempts INTEGER DEFAULT 3,
                started_at TIMESTAMP,
                completed_at TIMESTAMP,
                error_message TEXT,
                source_total_duration_seconds REAL,
                converted_duration_seconds REAL,
                duration_validation_passed BOOLEAN,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        // Migrations: older databases lack these columns
        let _ = conn.execute(
            "ALTER TABLE conversion_jobs ADD COLUMN catalog_item_id INTEGER",
            [],
        );
        let _ = conn.execute(
            "ALTER TABLE conversion_jobs ADD COLUMN source_total_duration_seconds REAL",
            [],
        );
        let _ = conn.execute(
            "ALTER TABLE conversion_jobs ADD COLUMN converted_duration_seconds REAL",
            [],
        );
        let _ = conn.execute(
            "ALTER TABLE conversion_jobs ADD COLUMN duration_validation_passed BOOLEAN",
            [],
        );

        conn.execute_batch(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_conversion_jobs_book_name_unique
                ON conversion_jobs(book_name);
            CREATE INDEX IF NOT EXISTS idx_conversion_jobs_status ON conversion_jobs(status);
            CREATE INDEX IF NOT EXISTS idx_conversion_jobs_created_at ON conversion_jobs(created_at);
            "#,
        )?;

        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ConversionJob> {
        let status_str: Option<String> = row.get(5)?;
        let started_at: Option<String> = row.get(8)?;
        let completed_at: Option<String> = row.get(9)?;
        let created_at_str: Option<String> = row.get(14)?;
        let updated_at_str: Option<String> = row.get(15)?;

        let created_at = created_at_str
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let updated_at = updated_at_str
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        Ok(ConversionJob {
            id: row.get(0)?,
            catalog_item_id: row.get(1)?,
            book_name: row.get(2)?,
            source_path: row.get(3)?,
            backup_path: row.get(4)?,
            status: status_str
                .and_then(|s| s.parse::<JobStatus>().ok())
                .unwrap_or(JobStatus::Pending),
            attempts: row.get::<_, Option<u32>>(6)?.unwrap_or(0),
            max_attempts: row
                .get::<_, Option<u32>>(7)?
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            started_at: started_at.as_deref().and_then(parse_timestamp),
            completed_at: completed_at.as_deref().and_then(parse_timestamp),
            error_message: row.get(10)?,
            source_total_duration_seconds: row.get(11)?,
            converted_duration_seconds: row.get(12)?,
            duration_validation_passed: row.get(13)?,
            created_at,
            updated_at,
        })
    }

    fn select_by_name(conn: &Connection, book_name: &str) -> rusqlite::Result<Option<ConversionJob>> {
        conn.query_row(
            &format!("SELECT {} FROM conversion_jobs WHERE book_name = ?", COLUMNS),
            params![book_name],
            Self::row_to_job,
        )
        .optional()
    }
}

impl JobStore for SqliteJobStore {
    fn transition(&self, transition: &JobTransition) -> Result<ConversionJob, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;

        let row = self.retry.run("upsert conversion job", || {
            conn.execute(
                r#"
                INSERT INTO conversion_jobs
                    (book_name, status, catalog_item_id, source_path, backup_path, max_attempts,
                     error_message, attempts, started_at, completed_at, created_at, updated_at)
                VALUES (
                    ?1, ?2, ?3, COALESCE(?4, ''), ?5, COALESCE(?6, 3),
                    CASE WHEN ?2 = 'failed' THEN ?7 END,
                    CASE WHEN ?2 = 'processing' THEN 1 ELSE 0 END,
                    CASE WHEN ?2 = 'processing' THEN ?8 END,
                    CASE WHEN ?2 IN ('completed', 'failed') THEN ?8 END,
                    ?8, ?8
                )
                ON CONFLICT(book_name) DO UPDATE SET
                    status = ?2,
                    catalog_item_id = COALESCE(?3, catalog_item_id),
                    source_path = COALESCE(?4, source_path),
                    backup_path = COALESCE(?5, backup_path),
                    max_attempts = COALESCE(?6, max_attempts),
                    attempts = COALESCE(attempts, 0)
                        + CASE WHEN ?2 = 'processing' THEN 1 ELSE 0 END,
                    started_at = CASE WHEN ?2 = 'processing' THEN ?8 ELSE started_at END,
                    completed_at = CASE
                        WHEN ?2 IN ('completed', 'failed') THEN ?8
                        WHEN ?2 = 'processing' THEN NULL
                        ELSE completed_at END,
                    error_message = CASE
                        WHEN ?2 = 'failed' THEN ?7
                        WHEN ?2 IN ('processing', 'completed') THEN NULL
                        ELSE error_message END,
                    source_total_duration_seconds = CASE
                        WHEN ?2 = 'processing' THEN NULL ELSE source_total_duration_seconds END,
                    converted_duration_seconds = CASE
                        WHEN ?2 = 'processing' THEN NULL ELSE converted_duration_seconds END,
                    duration_validation_passed = CASE
                        WHEN ?2 = 'processing' THEN NULL ELSE duration_validation_passed END,
                    updated_at = ?8
                "#,
                params![
                    transition.book_name,
                    transition.status.as_str(),
                    transition.catalog_item_id,
                    transition.source_path,
                    transition.backup_path,
                    transition.max_attempts,
                    transition.error_message,
                    now,
                ],
            )?;
            Self::select_by_name(&conn, &transition.book_name)
        })?;

        row.ok_or_else(|| StoreError::NotFound(transition.book_name.clone()))
    }

    fn record_durations(
        &self,
        book_name: &str,
        report: &DurationReport,
    ) -> Result<ConversionJob, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;

        let row = self.retry.run("record conversion durations", || {
            conn.execute(
                r#"
                UPDATE conversion_jobs
                SET source_total_duration_seconds = ?1,
                    converted_duration_seconds = ?2,
                    duration_validation_passed = ?3,
                    updated_at = ?4
                WHERE book_name = ?5
                "#,
                params![
                    report.source_total_seconds,
                    report.converted_seconds,
                    report.validation_passed,
                    now,
                    book_name,
                ],
            )?;
            Self::select_by_name(&conn, book_name)
        })?;

        row.ok_or_else(|| StoreError::NotFound(book_name.to_string()))
    }

    fn get(&self, book_name: &str) -> Result<Option<ConversionJob>, StoreError> {
        let conn = lock_conn(&self.conn)?;
        self.retry
            .run("get conversion job", || Self::select_by_name(&conn, book_name))
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<ConversionJob>, StoreError> {
        let conn = lock_conn(&self.conn)?;
        let status = filter.status.map(|s| s.as_str());

        self.retry.run("list conversion jobs", || {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM conversion_jobs WHERE (?1 IS NULL OR status = ?1) \
                 ORDER BY updated_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![status, filter.limit, filter.offset], Self::row_to_job)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }

    fn cancel(&self, book_name: &str) -> Result<ConversionJob, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;

        let row = self.retry.run("cancel conversion job", || {
            conn.execute(
                "UPDATE conversion_jobs SET status = 'cancelled', updated_at = ?1 WHERE book_name = ?2",
                params![now, book_name],
            )?;
            Self::select_by_name(&conn, book_name)
        })?;

        row.ok_or_else(|| StoreError::NotFound(book_name.to_string()))
    }
}
