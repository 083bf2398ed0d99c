//! Conversion job rows (`conversion_jobs`), owned by the orchestrator.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{JobFilter, JobStore};
pub use types::{ConversionJob, DurationReport, JobStatus, JobTransition};
