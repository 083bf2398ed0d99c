use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;

use super::StoreError;
use crate::config::DatabaseConfig;

/// Open a connection to the shared database file.
///
/// The parent directory is created if needed. The connection runs in WAL mode
/// with `synchronous=NORMAL` and the configured busy timeout.
pub fn open_connection(config: &DatabaseConfig) -> Result<Connection, StoreError> {
    open_path(&config.path, config.busy_timeout_ms)
}

/// Open a private in-memory database (tests).
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    conn.busy_timeout(Duration::from_millis(1000))?;
    Ok(conn)
}

fn open_path(path: &Path, busy_timeout_ms: u64) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    // journal_mode returns a row, so it cannot go through execute_batch.
    let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    conn.execute_batch(
        r#"
        PRAGMA synchronous=NORMAL;
        PRAGMA cache_size=10000;
        PRAGMA temp_store=MEMORY;
        "#,
    )?;
    Ok(conn)
}

/// Lock a store's connection, mapping a poisoned mutex to a store error.
pub fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
}
