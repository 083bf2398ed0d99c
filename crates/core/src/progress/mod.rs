//! Progress inferencer.
//!
//! The conversion tool reports nothing while it runs. Progress is read from
//! what it leaves in two staging trees: `merge` holds the inputs (the file
//! count) and `untagged` holds outputs named per [`MarkerProtocol`].

mod classify;
mod config;
mod error;
mod eta;
mod inferencer;
mod markers;
mod scanner;
mod watcher;

pub use classify::{
    classify_absent, classify_merge_only, classify_staged, resolve_total, Classification,
    LABEL_FINALIZING, LABEL_NO_RESULT, LABEL_SETTLING, LABEL_UNCLEAR,
};
pub use config::ProgressConfig;
pub use error::ProgressError;
pub use eta::{estimate_eta, MAX_ETA_SECONDS};
pub use inferencer::{ProgressInferencer, ScanReport};
pub use markers::MarkerProtocol;
pub use scanner::{StagingScanner, UntaggedObservation};
pub use watcher::ProgressWatcher;
