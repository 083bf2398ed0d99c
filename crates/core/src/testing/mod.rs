//! Testing utilities and mock implementations for pipeline tests.
//!
//! The mocks stand in for the external conversion tool and ffprobe, and
//! [`fixtures::TestPipeline`] wires in-memory stores, an in-process bus and a
//! scratch directory tree into a ready orchestrator.
//!
//! # Example
//!
//! ```rust,ignore
//! use bookbinder_core::testing::fixtures::TestPipeline;
//!
//! let temp = tempfile::TempDir::new()?;
//! let pipeline = TestPipeline::new(temp.path())?;
//! let source = pipeline.write_source("Dune", 3)?;
//!
//! let orchestrator = pipeline.orchestrator();
//! // Drive handlers, then inspect pipeline.jobs / pipeline.bus ...
//! ```

mod mock_converter;

pub use mock_converter::{MockConversionTool, MockDurationProbe};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::{MockConversionTool, MockDurationProbe};
    use crate::backup::{BackupConfig, BackupStore};
    use crate::bus::InMemoryEventBus;
    use crate::catalog::SqliteCatalog;
    use crate::database::StoreError;
    use crate::jobs::SqliteJobStore;
    use crate::logsink::LogSinkHandle;
    use crate::orchestrator::{ConversionOrchestrator, OrchestratorConfig, PipelineStores};
    use crate::progress::ProgressConfig;
    use crate::tracking::SqliteTrackingStore;

    /// Write `count` small source files into `dir`, creating it.
    pub fn write_source_files(dir: &Path, count: usize) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        for i in 1..=count {
            std::fs::write(dir.join(format!("{:02}.mp3", i)), b"mp3")?;
        }
        Ok(dir.to_path_buf())
    }

    /// A complete pipeline over in-memory stores rooted at a scratch directory.
    ///
    /// Layout under `root`: `input/`, `output/`, `backups/` and
    /// `temp/{merge,untagged}/`.
    pub struct TestPipeline {
        pub config: OrchestratorConfig,
        pub progress: ProgressConfig,
        pub jobs: Arc<SqliteJobStore>,
        pub tracking: Arc<SqliteTrackingStore>,
        pub catalog: Arc<SqliteCatalog>,
        pub backups: Arc<BackupStore>,
        pub tool: Arc<MockConversionTool>,
        pub probe: Arc<MockDurationProbe>,
        pub bus: Arc<InMemoryEventBus>,
    }

    impl TestPipeline {
        pub fn new(root: &Path) -> Result<Self, StoreError> {
            let config = OrchestratorConfig::with_root(root);
            let catalog = Arc::new(SqliteCatalog::in_memory()?);
            let backups = Arc::new(BackupStore::new(
                BackupConfig::default().with_backup_dir(root.join("backups")),
                config.output_dir.clone(),
                catalog.clone(),
            ));

            Ok(Self {
                progress: ProgressConfig::with_temp_root(root.join("temp")),
                jobs: Arc::new(SqliteJobStore::in_memory()?),
                tracking: Arc::new(SqliteTrackingStore::in_memory()?),
                catalog,
                backups,
                tool: Arc::new(MockConversionTool::new()),
                probe: Arc::new(MockDurationProbe::new()),
                bus: Arc::new(InMemoryEventBus::default()),
                config,
            })
        }

        pub fn stores(&self) -> PipelineStores {
            PipelineStores {
                jobs: self.jobs.clone(),
                tracking: self.tracking.clone(),
                catalog: self.catalog.clone(),
            }
        }

        /// An orchestrator over this pipeline's parts, without duration checks.
        pub fn orchestrator(&self) -> ConversionOrchestrator {
            ConversionOrchestrator::new(
                self.config.clone(),
                self.stores(),
                self.backups.clone(),
                self.tool.clone(),
                self.bus.clone(),
                LogSinkHandle::disabled("converter"),
            )
        }

        /// Drop `count` source files into `{input_dir}/{book_name}`.
        pub fn write_source(&self, book_name: &str, count: usize) -> std::io::Result<PathBuf> {
            write_source_files(&self.config.input_dir.join(book_name), count)
        }
    }
}

pub use fixtures::TestPipeline;
