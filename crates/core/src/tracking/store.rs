//! Tracking storage trait.

use super::{ConversionTracking, TrackingStatus, TrackingUpdate};
use crate::database::StoreError;

/// Filter for listing tracking rows.
#[derive(Debug, Clone)]
pub struct TrackingFilter {
    /// Only rows in one of these statuses (empty = all).
    pub statuses: Vec<TrackingStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TrackingFilter {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            limit: 100,
            offset: 0,
        }
    }
}

impl TrackingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: &[TrackingStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Persistence for [`ConversionTracking`] rows, keyed by book name.
pub trait TrackingStore: Send + Sync {
    /// Insert or update the row for `update.book_name`.
    ///
    /// `converted_files` is clamped to `total_files` and the percentage is
    /// derived before writing. `created_at` is kept on update.
    fn upsert(&self, update: &TrackingUpdate) -> Result<ConversionTracking, StoreError>;

    fn get(&self, book_name: &str) -> Result<Option<ConversionTracking>, StoreError>;

    /// Rows ordered by most recently updated first.
    fn list(&self, filter: &TrackingFilter) -> Result<Vec<ConversionTracking>, StoreError>;
}
