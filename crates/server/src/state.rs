use std::sync::Arc;

use bookbinder_core::{
    BackupStore, Config, ConversionOrchestrator, EventBus, JobStore, TrackingStore,
};

/// Shared application state for the admin HTTP surface.
pub struct AppState {
    config: Config,
    jobs: Arc<dyn JobStore>,
    tracking: Arc<dyn TrackingStore>,
    backups: Arc<BackupStore>,
    orchestrator: Arc<ConversionOrchestrator>,
    bus: Arc<dyn EventBus>,
}

impl AppState {
    pub fn new(
        config: Config,
        jobs: Arc<dyn JobStore>,
        tracking: Arc<dyn TrackingStore>,
        backups: Arc<BackupStore>,
        orchestrator: Arc<ConversionOrchestrator>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            config,
            jobs,
            tracking,
            backups,
            orchestrator,
            bus,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn jobs(&self) -> &dyn JobStore {
        self.jobs.as_ref()
    }

    pub fn tracking(&self) -> &dyn TrackingStore {
        self.tracking.as_ref()
    }

    pub fn backups(&self) -> &BackupStore {
        self.backups.as_ref()
    }

    pub fn orchestrator(&self) -> &ConversionOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn bus(&self) -> &dyn EventBus {
        self.bus.as_ref()
    }
}
