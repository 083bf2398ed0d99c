//! Conversion orchestrator.
//!
//! Listens for `download_complete` and `retry_conversion` events and runs
//! each book through backup, conversion, bookkeeping and result publication,
//! one book at a time.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{evaluate_retry, ConversionOrchestrator, PipelineStores, STARTING_LABEL};
pub use types::{ConversionOutcome, OrchestratorError, OrchestratorStatus, RetryAdmission};
