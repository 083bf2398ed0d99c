use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot directory as listed for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    /// Total size of all files in bytes.
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// What a downstream-success release actually removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    /// The snapshot directory deleted, if one was found.
    pub snapshot_removed: Option<PathBuf>,
    /// Whether a catalog pointer was cleared.
    pub pointer_cleared: bool,
    /// The converted output file deleted, if it existed.
    pub output_removed: Option<PathBuf>,
}
