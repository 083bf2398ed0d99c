//! Rescan triggers: startup, debounced filesystem events, and a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::error::ProgressError;
use super::inferencer::{ProgressInferencer, ScanReport};

/// Drives [`ProgressInferencer::rescan`] until shutdown.
pub struct ProgressWatcher {
    inferencer: Arc<ProgressInferencer>,
}

impl ProgressWatcher {
    pub fn new(inferencer: Arc<ProgressInferencer>) -> Self {
        Self { inferencer }
    }

    /// Watch both staging trees and rescan on change or every
    /// `rescan_interval_secs`, until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ProgressError> {
        let config = self.inferencer.config().clone();

        for dir in [&config.merge_dir, &config.untagged_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ProgressError::Watch {
                    path: dir.clone(),
                    reason: e.to_string(),
                })?;
        }

        info!("Performing initial scan...");
        self.scan("startup").await;

        // Capacity 1: a pending trigger already covers any later event.
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let mut debouncer = new_debouncer(
            Duration::from_millis(config.debounce_ms),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    if let Some(event) = events.first() {
                        debug!("File system event detected: {}", event.path.display());
                    }
                    let _ = trigger_tx.try_send(());
                }
                Err(e) => warn!("Watch error: {}", e),
            },
        )
        .map_err(|e| ProgressError::Watch {
            path: config.merge_dir.clone(),
            reason: e.to_string(),
        })?;

        for dir in [&config.merge_dir, &config.untagged_dir] {
            debouncer
                .watcher()
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| ProgressError::Watch {
                    path: dir.clone(),
                    reason: e.to_string(),
                })?;
        }
        info!(
            "Watching directories: {}, {}",
            config.merge_dir.display(),
            config.untagged_dir.display()
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(config.rescan_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the initial scan already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Progress watcher received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.scan("periodic").await;
                }
                Some(()) = trigger_rx.recv() => {
                    self.scan("filesystem event").await;
                }
            }
        }

        drop(debouncer);
        info!("Progress watcher stopped");
        Ok(())
    }

    /// Run one rescan off the async runtime. Errors are logged.
    pub async fn scan(&self, trigger: &str) -> Option<ScanReport> {
        debug!("Performing {} scan...", trigger);
        let inferencer = Arc::clone(&self.inferencer);
        match tokio::task::spawn_blocking(move || inferencer.rescan()).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                error!("Error scanning conversions: {}", e);
                None
            }
            Err(e) => {
                error!("Scan task failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::SqliteJobStore;
    use crate::logsink::LogSinkHandle;
    use crate::progress::ProgressConfig;
    use crate::tracking::{SqliteTrackingStore, TrackingStatus, TrackingStore};
    use tempfile::TempDir;

    fn inferencer(config: ProgressConfig, tracking: Arc<SqliteTrackingStore>) -> Arc<ProgressInferencer> {
        Arc::new(ProgressInferencer::new(
            config,
            tracking,
            Arc::new(SqliteJobStore::in_memory().unwrap()),
            LogSinkHandle::disabled("conversion-watcher"),
        ))
    }

    #[tokio::test]
    async fn test_initial_scan_and_shutdown() {
        let temp = TempDir::new().unwrap();
        let config = ProgressConfig::with_temp_root(temp.path());
        std::fs::create_dir_all(config.merge_dir.join("Dune")).unwrap();
        std::fs::write(config.merge_dir.join("Dune").join("01.mp3"), b"x").unwrap();

        let tracking = Arc::new(SqliteTrackingStore::in_memory().unwrap());
        let watcher = ProgressWatcher::new(inferencer(config.clone(), tracking.clone()));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        // Wait for the startup scan to land.
        let mut row = None;
        for _ in 0..50 {
            row = tracking.get("Dune").unwrap();
            if row.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let row = row.expect("startup scan should track the staged book");
        assert_eq!(row.status, TrackingStatus::Pending);
        assert!(config.untagged_dir.is_dir());

        shutdown_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_filesystem_change_triggers_rescan() {
        let temp = TempDir::new().unwrap();
        let mut config = ProgressConfig::with_temp_root(temp.path());
        config.debounce_ms = 100;
        config.rescan_interval_secs = 3600;

        let tracking = Arc::new(SqliteTrackingStore::in_memory().unwrap());
        let watcher = ProgressWatcher::new(inferencer(config.clone(), tracking.clone()));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        // Let the startup scan and the watch registration finish first.
        for _ in 0..50 {
            if config.untagged_dir.is_dir() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(tracking.get("Dune").unwrap().is_none());

        let book = config.untagged_dir.join("Dune-tmpfiles");
        std::fs::create_dir_all(&book).unwrap();
        std::fs::write(book.join("01-converting.m4b"), b"x").unwrap();

        let mut row = None;
        for _ in 0..100 {
            row = tracking.get("Dune").unwrap();
            if row.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let row = row.expect("a file change should trigger a rescan");
        assert_eq!(row.status, TrackingStatus::Converting);
        assert_eq!(row.current_file.as_deref(), Some("01-converting.m4b"));

        shutdown_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_scan_returns_report() {
        let temp = TempDir::new().unwrap();
        let config = ProgressConfig::with_temp_root(temp.path());
        let book = config.untagged_dir.join("Emma-tmpfiles");
        std::fs::create_dir_all(&book).unwrap();
        std::fs::write(book.join("01-converting.m4b"), b"x").unwrap();

        let tracking = Arc::new(SqliteTrackingStore::in_memory().unwrap());
        let watcher = ProgressWatcher::new(inferencer(config, tracking));
        let report = watcher.scan("test").await.unwrap();
        assert_eq!(
            report.find("Emma").unwrap().current_file.as_deref(),
            Some("01-converting.m4b")
        );
    }
}
