//! Conversion invoker.
//!
//! Wraps the external conversion script (`tool input_dir output_dir book_name`)
//! as a child process under a hard timeout, and validates the result by
//! comparing ffprobe durations of the sources and the converted file.

mod config;
mod error;
mod m4b_tool;
mod probe;
mod sources;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use m4b_tool::M4bToolInvoker;
pub use probe::{format_duration, total_duration, validate_duration, FfprobeDurationProbe};
pub use sources::find_source_files;
pub use traits::{ConversionTool, DurationProbe};
pub use types::{DurationValidation, InvocationRequest, InvocationResult};
