//! Per-book status rules.

use super::scanner::UntaggedObservation;
use crate::jobs::{ConversionJob, JobStatus};
use crate::tracking::TrackingStatus;

pub const LABEL_SETTLING: &str = "Processing finished files...";
pub const LABEL_FINALIZING: &str = "Finalizing conversion...";
pub const LABEL_UNCLEAR: &str = "Status unclear - no folder or file count data";
pub const LABEL_NO_RESULT: &str = "Left staging without a recorded result";

/// Status, label and converted count for one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: TrackingStatus,
    pub current_file: Option<String>,
    pub converted_files: u32,
    /// Set when the status was guessed from the book leaving staging.
    pub inferred: bool,
}

impl Classification {
    fn new(status: TrackingStatus, current_file: Option<&str>, converted_files: u32) -> Self {
        Self {
            status,
            current_file: current_file.map(str::to_string),
            converted_files,
            inferred: false,
        }
    }
}

/// Pick `total_files`: merge count, then the last known non-zero value,
/// then every output seen under `untagged`.
pub fn resolve_total(merge_count: u32, previous_total: Option<u32>, untagged_outputs: Option<u32>) -> u32 {
    if merge_count > 0 {
        return merge_count;
    }
    if let Some(previous) = previous_total.filter(|t| *t > 0) {
        return previous;
    }
    untagged_outputs.unwrap_or(0)
}

/// Book with a folder under `untagged`.
pub fn classify_staged(observation: &UntaggedObservation, total_files: u32) -> Classification {
    let converted = observation.converted;

    if let Some(file) = &observation.in_progress {
        return Classification::new(TrackingStatus::Converting, Some(file), converted);
    }
    if observation.has_settling {
        return Classification::new(TrackingStatus::Converting, Some(LABEL_SETTLING), converted);
    }
    if converted > 0 {
        if converted >= total_files {
            return Classification::new(TrackingStatus::Completed, None, converted);
        }
        return Classification::new(TrackingStatus::Converting, Some(LABEL_FINALIZING), converted);
    }
    Classification::new(TrackingStatus::Pending, None, 0)
}

/// Book staged for input only, not yet written to `untagged`.
pub fn classify_merge_only() -> Classification {
    Classification::new(TrackingStatus::Pending, None, 0)
}

/// Tracked book no longer present in either staging area.
///
/// The job row is authoritative when it carries a terminal status. Without
/// one, the book is assumed completed only when `assume_completed` is set and
/// a file count is known.
pub fn classify_absent(
    job: Option<&ConversionJob>,
    total_files: u32,
    previous_converted: u32,
    assume_completed: bool,
) -> Classification {
    match job.map(|j| j.status) {
        Some(JobStatus::Completed) => {
            return Classification::new(TrackingStatus::Completed, None, total_files)
        }
        Some(JobStatus::Failed) => {
            return Classification::new(
                TrackingStatus::Failed,
                None,
                previous_converted.min(total_files),
            )
        }
        _ => {}
    }

    if total_files == 0 {
        return Classification::new(TrackingStatus::Unknown, Some(LABEL_UNCLEAR), 0);
    }

    if assume_completed {
        let mut classification = Classification::new(TrackingStatus::Completed, None, total_files);
        classification.inferred = true;
        return classification;
    }

    Classification::new(
        TrackingStatus::Unknown,
        Some(LABEL_NO_RESULT),
        previous_converted.min(total_files),
    )
}
