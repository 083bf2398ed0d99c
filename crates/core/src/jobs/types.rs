//! Conversion job data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Orchestrator-owned lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed or failed. These are the explicit end markers the progress
    /// inferencer trusts over filesystem absence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// The current job row for a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: i64,
    pub catalog_item_id: Option<i64>,
    pub book_name: String,
    pub source_path: String,
    pub backup_path: Option<String>,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub source_total_duration_seconds: Option<f64>,
    pub converted_duration_seconds: Option<f64>,
    pub duration_validation_passed: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionJob {
    /// Whether every allowed attempt has been used.
    pub fn retry_budget_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// A status change for a book's job row.
///
/// `None` fields leave the stored value untouched on update.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTransition {
    pub book_name: String,
    pub status: JobStatus,
    pub catalog_item_id: Option<i64>,
    pub source_path: Option<String>,
    pub backup_path: Option<String>,
    pub max_attempts: Option<u32>,
    pub error_message: Option<String>,
}

impl JobTransition {
    pub fn new(book_name: impl Into<String>, status: JobStatus) -> Self {
        Self {
            book_name: book_name.into(),
            status,
            catalog_item_id: None,
            source_path: None,
            backup_path: None,
            max_attempts: None,
            error_message: None,
        }
    }

    pub fn pending(book_name: impl Into<String>) -> Self {
        Self::new(book_name, JobStatus::Pending)
    }

    pub fn processing(book_name: impl Into<String>) -> Self {
        Self::new(book_name, JobStatus::Processing)
    }

    pub fn completed(book_name: impl Into<String>) -> Self {
        Self::new(book_name, JobStatus::Completed)
    }

    pub fn failed(book_name: impl Into<String>, error_message: impl Into<String>) -> Self {
        let mut transition = Self::new(book_name, JobStatus::Failed);
        transition.error_message = Some(error_message.into());
        transition
    }

    pub fn with_catalog_item(mut self, catalog_item_id: Option<i64>) -> Self {
        self.catalog_item_id = catalog_item_id;
        self
    }

    pub fn with_source_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    pub fn with_backup_path(mut self, backup_path: impl Into<String>) -> Self {
        self.backup_path = Some(backup_path.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Source/converted duration comparison stored after a successful conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationReport {
    pub source_total_seconds: Option<f64>,
    pub converted_seconds: Option<f64>,
    pub validation_passed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!("cancelled".parse::<JobStatus>().unwrap(), JobStatus::Cancelled);
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_failed_transition_carries_message() {
        let t = JobTransition::failed("Dune", "exit code 1");
        assert_eq!(t.status, JobStatus::Failed);
        assert_eq!(t.error_message.as_deref(), Some("exit code 1"));
        assert!(t.source_path.is_none());
    }
}
