use std::time::Duration;

use rusqlite::ErrorCode;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

use super::StoreError;
use crate::config::LockRetryConfig;

/// Whether a SQLite error is "database is locked" or "database is busy".
pub fn is_lock_contention(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        _ => false,
    }
}

/// Retry policy for statements that hit lock contention.
#[derive(Debug, Clone)]
pub struct LockRetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self::from_config(&LockRetryConfig::default())
    }
}

impl LockRetryPolicy {
    pub fn from_config(config: &LockRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.saturating_sub(1) as i32);
        self.initial_delay.mul_f64(factor.max(0.0))
    }

    /// Run `op`, retrying while it fails with lock contention.
    ///
    /// Non-contention errors are returned immediately. On a multi-thread runtime
    /// the backoff sleep hands the worker's other tasks to another thread.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, rusqlite::Error>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if is_lock_contention(&e) => {
                    if attempt >= self.max_attempts {
                        return Err(StoreError::LockContention {
                            attempts: attempt,
                            message: format!("{}: {}", operation, e),
                        });
                    }
                    let delay = self.delay_for_retry(attempt);
                    warn!(
                        "Database locked during {}, retrying in {:?} (attempt {}/{})",
                        operation, delay, attempt, self.max_attempts
                    );
                    backoff(delay);
                    attempt += 1;
                }
                Err(e) => return Err(StoreError::Database(e.to_string())),
            }
        }
    }
}

fn backoff(delay: Duration) {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| std::thread::sleep(delay))
        }
        _ => std::thread::sleep(delay),
    }
}
