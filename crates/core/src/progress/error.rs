use std::path::PathBuf;
use thiserror::Error;

use crate::database::StoreError;

/// Errors from scanning staging directories.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Failed to read staging directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to watch {path}: {reason}")]
    Watch { path: PathBuf, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
