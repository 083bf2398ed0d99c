pub mod backup;
pub mod bus;
pub mod catalog;
pub mod config;
pub mod converter;
pub mod database;
pub mod jobs;
pub mod logsink;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod testing;
pub mod tracking;

pub use backup::{BackupConfig, BackupError, BackupInfo, BackupStore, ReleaseOutcome};
pub use bus::{
    BusConfig, BusError, Channel, EventBus, InMemoryEventBus, InboundEvent, RedisEventBus,
};
pub use catalog::{CatalogItem, CatalogStore, SqliteCatalog};
pub use config::{
    load_config, load_config_from_str, validate_config, AdminConfig, Config, ConfigError,
    DatabaseConfig, LogFormat, LoggingConfig,
};
pub use converter::{
    ConversionTool, ConverterConfig, ConverterError, DurationProbe, FfprobeDurationProbe,
    M4bToolInvoker,
};
pub use database::StoreError;
pub use jobs::{ConversionJob, JobFilter, JobStatus, JobStore, SqliteJobStore};
pub use logsink::{create_log_sink, LogSinkConfig, LogSinkHandle};
pub use orchestrator::{
    ConversionOrchestrator, ConversionOutcome, OrchestratorConfig, OrchestratorError,
    PipelineStores, RetryAdmission,
};
pub use progress::{ProgressConfig, ProgressInferencer, ProgressWatcher};
pub use tracking::{
    ConversionTracking, SqliteTrackingStore, TrackingFilter, TrackingStatus, TrackingStore,
};
