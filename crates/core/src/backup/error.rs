//! Error types for the backup module.

use std::path::PathBuf;
use thiserror::Error;

use crate::database::StoreError;

/// Errors that can occur while managing snapshots.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Failed to create a directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy a file.
    #[error("Failed to copy {source_path} to {destination}")]
    CopyFailed {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to remove a file or directory.
    #[error("Failed to remove {path}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refused to touch a path outside the backup root.
    #[error("Path is outside the backup root: {path}")]
    OutsideBackupRoot { path: PathBuf },

    /// Failed to walk a directory tree.
    #[error("Failed to read directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// Catalog pointer read or write failed.
    #[error("Catalog error: {0}")]
    Store(#[from] StoreError),

    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    pub fn copy_failed(source_path: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::CopyFailed {
            source_path,
            destination,
            error,
        }
    }

    pub fn remove_failed(path: PathBuf, source: std::io::Error) -> Self {
        Self::RemoveFailed { path, source }
    }
}
