//! Job storage trait.

use super::{ConversionJob, DurationReport, JobStatus, JobTransition};
use crate::database::StoreError;

/// Filter for listing jobs.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Persistence for [`ConversionJob`] rows, one per book.
pub trait JobStore: Send + Sync {
    /// Upsert the book's row into the transition's status.
    ///
    /// Entering `processing` increments `attempts`, sets `started_at` and
    /// clears `completed_at`, `error_message` and the duration fields.
    /// Entering `completed` or `failed` sets `completed_at`.
    fn transition(&self, transition: &JobTransition) -> Result<ConversionJob, StoreError>;

    /// Store the duration validation outcome.
    fn record_durations(
        &self,
        book_name: &str,
        report: &DurationReport,
    ) -> Result<ConversionJob, StoreError>;

    fn get(&self, book_name: &str) -> Result<Option<ConversionJob>, StoreError>;

    /// Rows ordered by most recently updated first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<ConversionJob>, StoreError>;

    /// Flip the stored status to `cancelled`. Nothing else is touched.
    fn cancel(&self, book_name: &str) -> Result<ConversionJob, StoreError>;
}
