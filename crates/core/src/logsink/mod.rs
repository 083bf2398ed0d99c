//! Fire-and-forget shipping of service messages to the external log API.
//!
//! Emitters hold a [`LogSinkHandle`] and never wait on the network; a
//! [`LogShipper`] task delivers records with bounded retries.

mod config;
mod handle;
mod shipper;

pub use config::LogSinkConfig;
pub use handle::{LogLevel, LogRecord, LogSinkHandle};
pub use shipper::{
    create_log_sink, create_log_sink_with_transport, HttpLogTransport, LogShipper, LogSinkError,
    LogTransport,
};
