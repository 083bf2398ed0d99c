//! SQLite-backed catalog store.

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CatalogItem, CatalogStore, CatalogTitle};
use crate::config::DatabaseConfig;
use crate::database::{
    lock_conn, open_connection, open_in_memory, parse_timestamp, LockRetryPolicy, StoreError,
};

/// SQLite-backed [`CatalogStore`] over the shared `catalog_items` table.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    retry: LockRetryPolicy,
}

impl SqliteCatalog {
    pub fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let conn = open_connection(config)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry: LockRetryPolicy::from_config(&config.lock_retry),
        })
    }

    /// Create an in-memory catalog (useful for testing).
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
            CREATE TABLE IF NOT EXISTS catalog_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                conversion_backup_path TEXT,
                conversion_attempts INTEGER DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_catalog_items_title ON catalog_items(title);
            "#,
        )?;

        // The ingestion service may have created the table without these
        let _ = conn.execute(
            "ALTER TABLE catalog_items ADD COLUMN conversion_backup_path TEXT",
            [],
        );
        let _ = conn.execute(
            "ALTER TABLE catalog_items ADD COLUMN conversion_attempts INTEGER DEFAULT 0",
            [],
        );

        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<CatalogItem> {
        let created_at_str: Option<String> = row.get(4)?;
        let updated_at_str: Option<String> = row.get(5)?;
        let created_at = created_at_str
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let updated_at = updated_at_str
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        Ok(CatalogItem {
            id: row.get(0)?,
            title: row.get(1)?,
            conversion_backup_path: row.get(2)?,
            conversion_attempts: row.get::<_, Option<u32>>(3)?.unwrap_or(0),
            created_at,
            updated_at,
        })
    }
}

const COLUMNS: &str =
    "id, title, conversion_backup_path, conversion_attempts, created_at, updated_at";

impl CatalogStore for SqliteCatalog {
    fn get(&self, id: i64) -> Result<Option<CatalogItem>, StoreError> {
        let conn = lock_conn(&self.conn)?;
        self.retry.run("get catalog item", || {
            conn.query_row(
                &format!("SELECT {} FROM catalog_items WHERE id = ?", COLUMNS),
                params![id],
                Self::row_to_item,
            )
            .optional()
        })
    }

    fn find_by_title(&self, title: &str) -> Result<Option<CatalogItem>, StoreError> {
        let conn = lock_conn(&self.conn)?;
        self.retry.run("find catalog item", || {
            conn.query_row(
                &format!(
                    "SELECT {} FROM catalog_items WHERE title = ? ORDER BY id LIMIT 1",
                    COLUMNS
                ),
                params![title],
                Self::row_to_item,
            )
            .optional()
        })
    }

    fn titles(&self) -> Result<Vec<CatalogTitle>, StoreError> {
        let conn = lock_conn(&self.conn)?;
        self.retry.run("list catalog titles", || {
            let mut stmt = conn.prepare("SELECT id, title FROM catalog_items ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(CatalogTitle {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }

    fn set_backup_path(&self, id: i64, backup_path: Option<&str>) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;
        let changed = self.retry.run("set backup pointer", || {
            conn.execute(
                "UPDATE catalog_items SET conversion_backup_path = ?1, updated_at = ?2 WHERE id = ?3",
                params![backup_path, now, id],
            )
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("catalog item {}", id)));
        }
        Ok(())
    }

    fn increment_conversion_attempts(&self, id: i64) -> Result<u32, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;
        let attempts = self.retry.run("increment conversion attempts", || {
            conn.execute(
                "UPDATE catalog_items SET conversion_attempts = COALESCE(conversion_attempts, 0) + 1, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            conn.query_row(
                "SELECT conversion_attempts FROM catalog_items WHERE id = ?",
                params![id],
                |row| row.get::<_, u32>(0),
            )
            .optional()
        })?;
        attempts.ok_or_else(|| StoreError::NotFound(format!("catalog item {}", id)))
    }

    fn insert(&self, title: &str) -> Result<CatalogItem, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = lock_conn(&self.conn)?;
        self.retry.run("insert catalog item", || {
            conn.execute(
                "INSERT INTO catalog_items (title, conversion_attempts, created_at, updated_at) VALUES (?1, 0, ?2, ?2)",
                params![title, now],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {} FROM catalog_items WHERE id = ?", COLUMNS),
                params![id],
                Self::row_to_item,
            )
        })
    }
}
