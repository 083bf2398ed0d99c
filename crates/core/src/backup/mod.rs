//! Backup snapshots of conversion sources.
//!
//! A snapshot is a full copy of a book's source directory taken before the
//! conversion tool runs, stored as `{backup_dir}/{book_name}_{YYYYmmdd_HHMMSS}`.
//! Snapshots back the retry path and are released once the downstream tagging
//! stage reports success, or by retention cleanup.

mod config;
mod error;
mod store;
mod types;

pub use config::BackupConfig;
pub use error::BackupError;
pub use store::{snapshot_name, BackupStore, SNAPSHOT_TIMESTAMP_FORMAT};
pub use types::{BackupInfo, ReleaseOutcome};
