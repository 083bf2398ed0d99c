use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the backup store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Root directory holding all snapshots.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Successful conversions after which the live snapshot is deleted.
    #[serde(default = "default_retention")]
    pub retention: u32,
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/backups")
}

fn default_retention() -> u32 {
    3
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            retention: default_retention(),
        }
    }
}

impl BackupConfig {
    pub fn with_backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = backup_dir.into();
        self
    }

    pub fn with_retention(mut self, retention: u32) -> Self {
        self.retention = retention;
        self
    }
}
