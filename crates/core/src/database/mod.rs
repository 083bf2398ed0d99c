//! Shared SQLite plumbing.
//!
//! Every service opens the same database file. Connections are opened in WAL
//! mode with a busy timeout, and every statement runs under a
//! [`LockRetryPolicy`] so that short lock contention between processes is
//! retried with exponential backoff before surfacing as
//! [`StoreError::LockContention`].

mod connection;
mod error;
mod retry;

pub use connection::{lock_conn, open_connection, open_in_memory};
pub use error::StoreError;
pub use retry::{is_lock_contention, LockRetryPolicy};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a stored timestamp.
///
/// Rows written by this crate use RFC 3339. Rows written by other services
/// may carry SQLite's `CURRENT_TIMESTAMP` format (`YYYY-MM-DD HH:MM:SS`, UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_timestamp("2024-03-01T10:20:30+00:00").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_parse_sqlite_current_timestamp() {
        let dt = parse_timestamp("2024-03-01 10:20:30").unwrap();
        assert_eq!(dt.minute(), 20);
        assert_eq!(dt.second(), 30);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }
}
