//! Full rescan of the staging trees into tracking rows.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use super::classify::{
    classify_absent, classify_merge_only, classify_staged, resolve_total, Classification,
};
use super::config::ProgressConfig;
use super::error::ProgressError;
use super::eta::estimate_eta;
use super::markers::MarkerProtocol;
use super::scanner::StagingScanner;
use crate::jobs::JobStore;
use crate::logsink::LogSinkHandle;
use crate::metrics;
use crate::tracking::{
    progress_percentage, ConversionTracking, TrackingFilter, TrackingStatus, TrackingStore,
    TrackingUpdate,
};

/// Upper bound on tracked books revisited by the absence rule per scan.
const ACTIVE_ROW_LIMIT: i64 = 10_000;

/// Outcome of one full rescan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub updated: Vec<ConversionTracking>,
    /// Books whose update failed; the error is logged.
    pub failed: Vec<String>,
}

impl ScanReport {
    pub fn find(&self, book_name: &str) -> Option<&ConversionTracking> {
        self.updated.iter().find(|t| t.book_name == book_name)
    }
}

/// Where a book was found during a scan.
enum Sighting<'a> {
    Untagged(&'a str),
    MergeOnly,
    Absent,
}

/// Derives conversion progress from the tool's filesystem side effects.
pub struct ProgressInferencer {
    config: ProgressConfig,
    protocol: MarkerProtocol,
    scanner: StagingScanner,
    tracking: Arc<dyn TrackingStore>,
    jobs: Arc<dyn JobStore>,
    log_sink: LogSinkHandle,
}

impl ProgressInferencer {
    pub fn new(
        config: ProgressConfig,
        tracking: Arc<dyn TrackingStore>,
        jobs: Arc<dyn JobStore>,
        log_sink: LogSinkHandle,
    ) -> Self {
        let protocol = MarkerProtocol::V1;
        let scanner = StagingScanner::new(
            config.merge_dir.clone(),
            config.untagged_dir.clone(),
            protocol,
        );
        Self {
            config,
            protocol,
            scanner,
            tracking,
            jobs,
            log_sink,
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Visit untagged folders, then merge-only books, then tracked books that
    /// left staging while pending or converting.
    pub fn rescan(&self) -> Result<ScanReport, ProgressError> {
        let mut report = ScanReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for folder in self.scanner.untagged_folders()? {
            let book = self.protocol.book_name_from_folder(&folder).to_string();
            if book.is_empty() || !seen.insert(book.clone()) {
                continue;
            }
            self.record(&mut report, &book, Sighting::Untagged(&folder));
        }

        for book in self.scanner.merge_book_folders()? {
            if !seen.insert(book.clone()) {
                continue;
            }
            self.record(&mut report, &book, Sighting::MergeOnly);
        }

        let active = self.tracking.list(
            &TrackingFilter::new()
                .with_statuses(&[TrackingStatus::Pending, TrackingStatus::Converting])
                .with_limit(ACTIVE_ROW_LIMIT),
        )?;
        for row in active {
            if seen.contains(&row.book_name) {
                continue;
            }
            debug!("'{}' is tracked but no longer staged", row.book_name);
            seen.insert(row.book_name.clone());
            self.record(&mut report, &row.book_name, Sighting::Absent);
        }

        metrics::PROGRESS_SCANS.inc();
        debug!(
            "Scan finished: {} updated, {} failed",
            report.updated.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Re-derive a single book's row from the current staging state.
    pub fn update_book(&self, book_name: &str) -> Result<ConversionTracking, ProgressError> {
        match self.scanner.find_untagged_folder(book_name)? {
            Some(folder) => self.update(book_name, Sighting::Untagged(&folder)),
            None if self.scanner.merge_book_dir(book_name).is_some() => {
                self.update(book_name, Sighting::MergeOnly)
            }
            None => self.update(book_name, Sighting::Absent),
        }
    }

    fn record(&self, report: &mut ScanReport, book_name: &str, sighting: Sighting<'_>) {
        match self.update(book_name, sighting) {
            Ok(row) => report.updated.push(row),
            Err(e) => {
                error!("Error updating conversion tracking for '{}': {}", book_name, e);
                self.log_sink
                    .error(format!("Error updating conversion tracking: {}", e));
                report.failed.push(book_name.to_string());
            }
        }
    }

    fn update(
        &self,
        book_name: &str,
        sighting: Sighting<'_>,
    ) -> Result<ConversionTracking, ProgressError> {
        let existing = self.tracking.get(book_name)?;
        let previous_total = existing.as_ref().map(|t| t.total_files);
        let merge_count = self.scanner.merge_count(book_name);

        let (classification, total_files, merge_folder, temp_folder) = match sighting {
            Sighting::Untagged(folder) => {
                let observation = self.scanner.observe_untagged(folder);
                let total = resolve_total(merge_count, previous_total, Some(observation.all_outputs));
                (
                    classify_staged(&observation, total),
                    total,
                    Some(self.merge_folder_for(book_name)),
                    Some(self.scanner.untagged_dir().join(folder).display().to_string()),
                )
            }
            Sighting::MergeOnly => {
                let total = resolve_total(merge_count, previous_total, None);
                (
                    classify_merge_only(),
                    total,
                    Some(self.merge_folder_for(book_name)),
                    None,
                )
            }
            Sighting::Absent => {
                let total = resolve_total(0, previous_total, None);
                let job = self.jobs.get(book_name)?;
                let previous_converted = existing.as_ref().map_or(0, |t| t.converted_files);
                let classification = classify_absent(
                    job.as_ref(),
                    total,
                    previous_converted,
                    self.config.assume_completed_on_disappearance,
                );
                if classification.inferred {
                    info!(
                        "Marking '{}' as completed (inferred): no staging folders and no terminal job status",
                        book_name
                    );
                }
                (classification, total, None, None)
            }
        };

        let Classification {
            status,
            current_file,
            converted_files,
            ..
        } = classification;

        let converted_files = converted_files.min(total_files);
        let pct = progress_percentage(converted_files, total_files);
        let eta = existing
            .as_ref()
            .and_then(|row| estimate_eta(pct, row.created_at, Utc::now()));

        let update = TrackingUpdate {
            book_name: book_name.to_string(),
            total_files,
            converted_files,
            current_file,
            status,
            estimated_eta_seconds: eta,
            merge_folder_path: merge_folder,
            temp_folder_path: temp_folder,
        };
        let row = self.tracking.upsert(&update)?;

        let eta_str = row
            .estimated_eta_seconds
            .map(|s| format!(", ETA: {}s", s))
            .unwrap_or_default();
        let summary = format!(
            "Updated conversion tracking for '{}': {} ({:.1}%) - Total: {}, Converted: {}{}",
            book_name, row.status, row.progress_percentage, row.total_files, row.converted_files, eta_str
        );
        info!("{}", summary);
        self.log_sink.info(summary);

        Ok(row)
    }

    fn merge_folder_for(&self, book_name: &str) -> String {
        self.scanner
            .merge_book_dir(book_name)
            .unwrap_or_else(|| self.scanner.merge_dir().to_path_buf())
            .display()
            .to_string()
    }
}
