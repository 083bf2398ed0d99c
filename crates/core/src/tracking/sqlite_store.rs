//! SQLite-backed tracking store.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{ConversionTracking, TrackingFilter, TrackingStatus, TrackingStore, TrackingUpdate};
use crate::config::DatabaseConfig;
use crate::database::{
    lock_conn, open_connection, open_in_memory, parse_timestamp, LockRetryPolicy, StoreError,
};

const COLUMNS: &str = "id, book_name, total_files, converted_files, current_file, status, \
    progress_percentage, estimated_eta_seconds, merge_folder_path, temp_folder_path, \
    created_at, updated_at";

/// SQLite-backed [`TrackingStore`].
pub struct SqliteTrackingStore {
    conn: Mutex<Connection>,
    retry: LockRetryPolicy,
}

impl SqliteTrackingStore {
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
            CREATE TABLE IF NOT EXISTS conversion_tracking (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_name TEXT NOT NULL,
                total_files INTEGER DEFAULT 0,
                converted_files INTEGER DEFAULT 0,
                current_file TEXT,
                status TEXT DEFAULT 'pending',
                progress_percentage REAL DEFAULT 0.0,
                estimated_eta_seconds INTEGER,
                merge_folder_path TEXT,
                temp_folder_path TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_conversion_tracking_book_name
                ON conversion_tracking(book_name);
            CREATE INDEX IF NOT EXISTS idx_conversion_tracking_status
                ON conversion_tracking(status);
            CREATE INDEX IF NOT EXISTS idx_conversion_tracking_created_at
                ON conversion_tracking(created_at);
            "#,
        )?;

        // Migrations for databases created before these columns existed
        let _ = conn.execute(
            "ALTER TABLE conversion_tracking ADD COLUMN estimated_eta_seconds INTEGER",
            [],
        );
        let _ = conn.execute(
            "ALTER TABLE conversion_tracking ADD COLUMN merge_folder_path TEXT",
            [],
        );
        let _ = conn.execute(
            "ALTER TABLE conversion_tracking ADD COLUMN temp_folder_path TEXT",
            [],
        );

        Ok(())
    }

    fn row_to_tracking(row: &rusqlite::Row) -> rusqlite::Result<ConversionTracking> {
        let status_str: Option<String> = row.get(5)?;
        let created_at_str: Option<String> = row.get(10)?;
        let updated_at_str: Option<String> = row.get(11)?;

        let status = status_str
            .and_then(|s| s.parse::<TrackingStatus>().ok())
            .unwrap_or(TrackingStatus::Unknown);
        let created_at = created_at_str
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let updated_at = updated_at_str
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        Ok(ConversionTracking {
            id: row.get(0)?,
            book_name: row.get(1)?,
            total_files: row.get::<_, Option<u32>>(2)?.unwrap_or(0),
            converted_files: row.get::<_, Option<u32>>(3)?.unwrap_or(0),
            current_file: row.get(4)?,
            status,
            progress_percentage: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
            estimated_eta_seconds: row.get(7)?,
            merge_folder_path: row.get(8)?,
            temp_folder_path: row.get(9)?,
            created_at,
            updated_at,
        })
    }

    fn select_by_name(
        conn: &Connection,
        book_name: &str,
    ) -> rusqlite::Result<Option<ConversionTracking>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM conversion_tracking WHERE book_name = ?",
                COLUMNS
            ),
            params![book_name],
            Self::row_to_tracking,
        )
        .optional()
    }
}

impl TrackingStore for SqliteTrackingStore {
    fn upsert(&self, update: &TrackingUpdate) -> Result<ConversionTracking, StoreError> {
        let update = update.clamped();
        let percentage = update.progress_percentage();
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;

        let row = self.retry.run("upsert conversion tracking", || {
            conn.execute(
                r#"
                INSERT INTO conversion_tracking
                    (book_name, total_files, converted_files, current_file, status,
                     progress_percentage, estimated_eta_seconds, merge_folder_path,
                     temp_folder_path, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                ON CONFLICT(book_name) DO UPDATE SET
                    total_files = excluded.total_files,
                    converted_files = excluded.converted_files,
                    current_file = excluded.current_file,
                    status = excluded.status,
                    progress_percentage = excluded.progress_percentage,
                    estimated_eta_seconds = excluded.estimated_eta_seconds,
                    merge_folder_path = excluded.merge_folder_path,
                    temp_folder_path = excluded.temp_folder_path,
                    updated_at = excluded.updated_at
                "#,
                params![
                    update.book_name,
                    update.total_files,
                    update.converted_files,
                    update.current_file,
                    update.status.as_str(),
                    percentage,
                    update.estimated_eta_seconds,
                    update.merge_folder_path,
                    update.temp_folder_path,
                    now,
                ],
            )?;
            Self::select_by_name(&conn, &update.book_name)
        })?;

        row.ok_or_else(|| StoreError::NotFound(update.book_name.clone()))
    }

    fn get(&self, book_name: &str) -> Result<Option<ConversionTracking>, StoreError> {
        let conn = lock_conn(&self.conn)?;
        self.retry
            .run("get conversion tracking", || Self::select_by_name(&conn, book_name))
    }

    fn list(&self, filter: &TrackingFilter) -> Result<Vec<ConversionTracking>, StoreError> {
        let conn = lock_conn(&self.conn)?;

        let where_clause = if filter.statuses.is_empty() {
            String::new()
        } else {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            format!("WHERE status IN ({})", placeholders)
        };
        let sql = format!(
            "SELECT {} FROM conversion_tracking {} ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
            COLUMNS, where_clause
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = filter
            .statuses
            .iter()
            .map(|s| Box::new(s.as_str()) as Box<dyn rusqlite::ToSql>)
            .collect();
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        self.retry.run("list conversion tracking", || {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_tracking)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }
}
