//! File system backup store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::config::BackupConfig;
use super::error::BackupError;
use super::types::{BackupInfo, ReleaseOutcome};
use crate::catalog::{resolve_identity, CatalogStore};
use crate::progress::MarkerProtocol;

/// `strftime` format of the snapshot directory suffix.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Snapshot directory name for a book at a point in time.
pub fn snapshot_name(book_name: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", book_name, at.format(SNAPSHOT_TIMESTAMP_FORMAT))
}

/// Parses `{book_name}_{timestamp}[_{n}]` into its sort key.
fn parse_snapshot_suffix(book_name: &str, dir_name: &str) -> Option<(NaiveDateTime, u32)> {
    let rest = dir_name.strip_prefix(book_name)?.strip_prefix('_')?;
    // YYYYmmdd_HHMMSS is 15 characters
    if rest.len() < 15 || !rest.is_char_boundary(15) {
        return None;
    }
    let (stamp, tail) = rest.split_at(15);
    let at = NaiveDateTime::parse_from_str(stamp, SNAPSHOT_TIMESTAMP_FORMAT).ok()?;
    let counter = if tail.is_empty() {
        0
    } else {
        tail.strip_prefix('_')?.parse().ok()?
    };
    Some((at, counter))
}

/// Creates, restores, and releases source snapshots.
pub struct BackupStore {
    config: BackupConfig,
    output_dir: PathBuf,
    catalog: Arc<dyn CatalogStore>,
}

impl BackupStore {
    /// `output_dir` is where converted files land; release deletes from it.
    pub fn new(config: BackupConfig, output_dir: PathBuf, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            config,
            output_dir,
            catalog,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.config.backup_dir
    }

    pub fn retention(&self) -> u32 {
        self.config.retention
    }

    /// Copy `source` into a new timestamped snapshot.
    ///
    /// Returns `None` when the source does not exist. A partially written
    /// snapshot is removed before an error is returned.
    pub async fn create(
        &self,
        book_name: &str,
        source: &Path,
    ) -> Result<Option<PathBuf>, BackupError> {
        if !source.exists() {
            warn!("Backup source does not exist: {}", source.display());
            return Ok(None);
        }

        fs::create_dir_all(&self.config.backup_dir)
            .await
            .map_err(|e| BackupError::DirectoryCreationFailed {
                path: self.config.backup_dir.clone(),
                source: e,
            })?;

        let snapshot = self.reserve_snapshot_dir(book_name).await?;

        let copied = if source.is_dir() {
            copy_tree(source, &snapshot).await
        } else {
            let file_name = source.file_name().map(PathBuf::from).unwrap_or_default();
            let destination = snapshot.join(file_name);
            fs::copy(source, &destination)
                .await
                .map(|_| ())
                .map_err(|e| BackupError::copy_failed(source.to_path_buf(), destination, e))
        };

        if let Err(e) = copied {
            if let Err(cleanup) = fs::remove_dir_all(&snapshot).await {
                warn!(
                    "Failed to remove partial snapshot {}: {}",
                    snapshot.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        info!("Created backup: {}", snapshot.display());
        Ok(Some(snapshot))
    }

    /// Create the snapshot directory, adding `_1`, `_2`, ... on a same-second collision.
    async fn reserve_snapshot_dir(&self, book_name: &str) -> Result<PathBuf, BackupError> {
        let base = snapshot_name(book_name, Utc::now());
        let mut counter = 0u32;
        loop {
            let name = if counter == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, counter)
            };
            let candidate = self.config.backup_dir.join(&name);
            match fs::create_dir(&candidate).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("Snapshot {} exists, trying next suffix", candidate.display());
                    counter += 1;
                }
                Err(e) => {
                    return Err(BackupError::DirectoryCreationFailed {
                        path: candidate,
                        source: e,
                    })
                }
            }
        }
    }

    /// Replace `target` with the contents of `snapshot`.
    ///
    /// Returns `false` when the snapshot does not exist. Whatever was at
    /// `target` is removed first.
    pub async fn restore(&self, snapshot: &Path, target: &Path) -> Result<bool, BackupError> {
        if !snapshot.is_dir() {
            warn!("Backup path does not exist: {}", snapshot.display());
            return Ok(false);
        }

        if target.is_dir() {
            fs::remove_dir_all(target)
                .await
                .map_err(|e| BackupError::remove_failed(target.to_path_buf(), e))?;
        } else if target.exists() {
            fs::remove_file(target)
                .await
                .map_err(|e| BackupError::remove_failed(target.to_path_buf(), e))?;
        }

        copy_tree(snapshot, target).await?;
        info!(
            "Restored from backup: {} -> {}",
            snapshot.display(),
            target.display()
        );
        Ok(true)
    }

    /// All snapshots for `book_name`, most recent first.
    pub fn find_all(&self, book_name: &str) -> Result<Vec<PathBuf>, BackupError> {
        if !self.config.backup_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.config.backup_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = parse_snapshot_suffix(book_name, &name) {
                found.push((key, entry.path()));
            }
        }

        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// The most recent snapshot for `book_name` by directory name.
    pub fn find_latest(&self, book_name: &str) -> Result<Option<PathBuf>, BackupError> {
        Ok(self.find_all(book_name)?.into_iter().next())
    }

    /// Delete the pointed snapshot once the item's retention counter reaches
    /// the configured limit. Returns whether anything was released.
    pub async fn retention_cleanup(&self, catalog_item_id: i64) -> Result<bool, BackupError> {
        let item = match self.catalog.get(catalog_item_id)? {
            Some(item) => item,
            None => return Ok(false),
        };

        if item.conversion_attempts < self.config.retention {
            return Ok(false);
        }

        let Some(pointer) = item.conversion_backup_path else {
            return Ok(false);
        };

        let path = PathBuf::from(&pointer);
        if path.exists() {
            remove_path(&path).await?;
            info!("Cleaned up old backup: {}", path.display());
        }
        self.catalog.set_backup_path(item.id, None)?;
        Ok(true)
    }

    /// Release everything kept for rollback after the tagging stage succeeded.
    ///
    /// Deletes the pointed snapshot (or the newest pattern match when no
    /// pointer is set), clears the pointer, and deletes the converted output.
    pub async fn release_on_downstream_success(
        &self,
        book_name: &str,
        catalog_item_id: Option<i64>,
    ) -> Result<ReleaseOutcome, BackupError> {
        let mut outcome = ReleaseOutcome::default();

        let item_id = match catalog_item_id {
            Some(id) => Some(id),
            None => resolve_identity(self.catalog.as_ref(), book_name)?,
        };
        let item = match item_id {
            Some(id) => self.catalog.get(id)?,
            None => None,
        };

        match item.as_ref().and_then(|i| i.conversion_backup_path.clone()) {
            Some(pointer) => {
                let path = PathBuf::from(pointer);
                if path.exists() {
                    remove_path(&path).await?;
                    info!("Cleaned up backup after downstream success: {}", path.display());
                    outcome.snapshot_removed = Some(path);
                } else {
                    warn!("Backup pointer does not exist: {}", path.display());
                }
                if let Some(item) = &item {
                    self.catalog.set_backup_path(item.id, None)?;
                    outcome.pointer_cleared = true;
                }
            }
            None => {
                debug!("No backup pointer for {}, scanning by name", book_name);
                match self.find_latest(book_name)? {
                    Some(path) => {
                        remove_path(&path).await?;
                        info!("Cleaned up backup by pattern: {}", path.display());
                        outcome.snapshot_removed = Some(path);
                    }
                    None => info!("No backup found to clean up for {}", book_name),
                }
            }
        }

        let output = self
            .output_dir
            .join(MarkerProtocol::V1.output_file_name(book_name));
        if output.is_file() {
            fs::remove_file(&output)
                .await
                .map_err(|e| BackupError::remove_failed(output.clone(), e))?;
            info!("Cleaned up converted file: {}", output.display());
            outcome.output_removed = Some(output);
        }

        Ok(outcome)
    }

    /// All snapshots, newest first.
    pub fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        if !self.config.backup_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.config.backup_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let metadata = entry.metadata()?;
            let modified: DateTime<Utc> = metadata.modified()?.into();
            let created: DateTime<Utc> = metadata.created().map(Into::into).unwrap_or(modified);

            backups.push(BackupInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path(),
                size: tree_size(&entry.path())?,
                created,
                modified,
            });
        }

        backups.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.name.cmp(&a.name)));
        Ok(backups)
    }

    /// Delete one snapshot. Returns `false` when it does not exist.
    pub async fn delete(&self, path: &Path) -> Result<bool, BackupError> {
        if !path.exists() {
            warn!("Backup does not exist: {}", path.display());
            return Ok(false);
        }

        let root = std::fs::canonicalize(&self.config.backup_dir)?;
        let resolved = std::fs::canonicalize(path)?;
        if resolved == root || !resolved.starts_with(&root) {
            return Err(BackupError::OutsideBackupRoot {
                path: path.to_path_buf(),
            });
        }

        remove_path(&resolved).await?;
        info!("Deleted backup: {}", resolved.display());
        Ok(true)
    }

    /// Delete a snapshot by directory name.
    pub async fn delete_by_name(&self, name: &str) -> Result<bool, BackupError> {
        let candidate = Path::new(name);
        if name.is_empty() || candidate.components().count() != 1 || name == ".." || name == "." {
            return Err(BackupError::OutsideBackupRoot {
                path: candidate.to_path_buf(),
            });
        }
        self.delete(&self.config.backup_dir.join(name)).await
    }
}

/// Recursively copy the contents of `source` into `destination`.
async fn copy_tree(source: &Path, destination: &Path) -> Result<(), BackupError> {
    fs::create_dir_all(destination)
        .await
        .map_err(|e| BackupError::DirectoryCreationFailed {
            path: destination.to_path_buf(),
            source: e,
        })?;

    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .await
                .map_err(|e| BackupError::DirectoryCreationFailed {
                    path: target.clone(),
                    source: e,
                })?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    BackupError::DirectoryCreationFailed {
                        path: parent.to_path_buf(),
                        source: e,
                    }
                })?;
            }
            fs::copy(entry.path(), &target)
                .await
                .map_err(|e| BackupError::copy_failed(entry.path().to_path_buf(), target.clone(), e))?;
        }
    }

    Ok(())
}

async fn remove_path(path: &Path) -> Result<(), BackupError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| BackupError::remove_failed(path.to_path_buf(), e))
}

fn tree_size(path: &Path) -> Result<u64, BackupError> {
    let mut total = 0;
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
