//! Types for the conversion orchestrator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::BackupError;
use crate::bus::BusError;
use crate::converter::ConverterError;
use crate::database::StoreError;

/// Errors that end a handler early.
///
/// Tool failures are not errors here: they are recorded on the job and
/// reported as [`ConversionOutcome::Failed`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("converter error: {0}")]
    Converter(#[from] ConverterError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// A retry found neither a stored pointer nor a matching snapshot.
    #[error("no backup found for {0}")]
    BackupMissing(String),
}

/// Result of a handler that ran to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Completed {
        output_path: PathBuf,
        validation_passed: Option<bool>,
    },
    Failed {
        error_message: String,
    },
    /// The book already has a job in `processing`.
    SkippedInProgress,
    /// The retry budget is spent and `force` was not set.
    RetryRejected { attempts: u32, max_attempts: u32 },
}

impl ConversionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Decision of the retry admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RetryAdmission {
    Admitted { attempts: u32, max_attempts: u32 },
    /// Over budget, let through by `force`.
    Forced { attempts: u32, max_attempts: u32 },
    Rejected { attempts: u32, max_attempts: u32 },
}

impl RetryAdmission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Label used for the retry request metric.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "admitted",
            Self::Forced { .. } => "forced",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the event loop is running.
    pub running: bool,
    /// Jobs currently in `processing`.
    pub processing_count: usize,
    pub failed_count: usize,
    pub completed_count: usize,
    /// Messages handled since start.
    pub events_handled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_labels() {
        let rejected = RetryAdmission::Rejected {
            attempts: 3,
            max_attempts: 3,
        };
        assert!(!rejected.is_allowed());
        assert_eq!(rejected.label(), "rejected");

        let forced = RetryAdmission::Forced {
            attempts: 4,
            max_attempts: 3,
        };
        assert!(forced.is_allowed());
        assert_eq!(forced.label(), "forced");
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(ConversionOutcome::RetryRejected {
            attempts: 3,
            max_attempts: 3,
        })
        .unwrap();
        assert_eq!(json["outcome"], "retry_rejected");
        assert_eq!(json["attempts"], 3);

        let json = serde_json::to_value(ConversionOutcome::SkippedInProgress).unwrap();
        assert_eq!(json["outcome"], "skipped_in_progress");
    }

    #[test]
    fn test_status_default() {
        let status = OrchestratorStatus::default();
        assert!(!status.running);
        assert_eq!(status.processing_count, 0);
    }
}
