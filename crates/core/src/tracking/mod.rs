//! Per-book conversion progress rows (`conversion_tracking`).
//!
//! Written by the orchestrator when it starts and finishes a conversion and
//! by the progress inferencer on every scan.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTrackingStore;
pub use store::{TrackingFilter, TrackingStore};
pub use types::{progress_percentage, ConversionTracking, TrackingStatus, TrackingUpdate};
