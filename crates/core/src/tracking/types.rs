//! Conversion tracking data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Human-visible conversion status of a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Pending,
    Converting,
    Completed,
    Failed,
    Unknown,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Converting => "converting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Statuses the inferencer keeps revisiting when a book leaves staging.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Converting)
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "converting" => Ok(Self::Converting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown tracking status: {}", other)),
        }
    }
}

/// Progress percentage for a file count pair. Zero when nothing is known.
pub fn progress_percentage(converted_files: u32, total_files: u32) -> f64 {
    if total_files == 0 {
        return 0.0;
    }
    (converted_files as f64 / total_files as f64) * 100.0
}

/// One tracking row per book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionTracking {
    pub id: i64,
    pub book_name: String,
    pub total_files: u32,
    pub converted_files: u32,
    pub current_file: Option<String>,
    pub status: TrackingStatus,
    pub progress_percentage: f64,
    pub estimated_eta_seconds: Option<i64>,
    pub merge_folder_path: Option<String>,
    pub temp_folder_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of a book's mutable tracking fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingUpdate {
    pub book_name: String,
    pub total_files: u32,
    pub converted_files: u32,
    pub current_file: Option<String>,
    pub status: TrackingStatus,
    pub estimated_eta_seconds: Option<i64>,
    pub merge_folder_path: Option<String>,
    pub temp_folder_path: Option<String>,
}

impl TrackingUpdate {
    pub fn new(book_name: impl Into<String>, status: TrackingStatus) -> Self {
        Self {
            book_name: book_name.into(),
            total_files: 0,
            converted_files: 0,
            current_file: None,
            status,
            estimated_eta_seconds: None,
            merge_folder_path: None,
            temp_folder_path: None,
        }
    }

    pub fn with_files(mut self, converted_files: u32, total_files: u32) -> Self {
        self.converted_files = converted_files;
        self.total_files = total_files;
        self
    }

    pub fn with_current_file(mut self, current_file: impl Into<String>) -> Self {
        self.current_file = Some(current_file.into());
        self
    }

    /// Copy with `converted_files <= total_files` enforced.
    pub fn clamped(&self) -> Self {
        let mut update = self.clone();
        update.converted_files = update.converted_files.min(update.total_files);
        update
    }

    pub fn progress_percentage(&self) -> f64 {
        progress_percentage(self.converted_files, self.total_files)
    }
}
