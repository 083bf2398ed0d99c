use thiserror::Error;

/// Errors returned by the SQLite-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The database stayed locked after all retry attempts.
    #[error("Database locked after {attempts} attempts: {message}")]
    LockContention { attempts: u32, message: String },

    /// Any other database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the error came from lock contention rather than a bad query.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::LockContention { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
