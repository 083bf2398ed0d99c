//! Conversion orchestrator implementation.
//!
//! Consumes `download_complete` and `retry_conversion` events one at a time
//! and drives each book through backup, conversion and result publication.
//! Every job transition is written to the job store before anything is
//! published, so the progress inferencer can trust terminal rows.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, error, info, warn};

use crate::backup::BackupStore;
use crate::bus::{
    publish_event, BusMessage, Channel, ConversionComplete, ConversionFailed, DownloadComplete,
    EventBus, InboundEvent, RetryConversion,
};
use crate::catalog::{resolve_identity, CatalogStore};
use crate::converter::{
    find_source_files, total_duration, validate_duration, ConversionTool, DurationProbe,
    InvocationRequest, InvocationResult,
};
use crate::jobs::{ConversionJob, DurationReport, JobFilter, JobStatus, JobStore, JobTransition};
use crate::logsink::{LogLevel, LogSinkHandle};
use crate::metrics;
use crate::progress::MarkerProtocol;
use crate::tracking::{TrackingStatus, TrackingStore, TrackingUpdate};

use super::config::OrchestratorConfig;
use super::types::{ConversionOutcome, OrchestratorError, OrchestratorStatus, RetryAdmission};

/// `current_file` label written when a run starts.
pub const STARTING_LABEL: &str = "Starting conversion...";

/// The stores the orchestrator reads and writes.
#[derive(Clone)]
pub struct PipelineStores {
    pub jobs: Arc<dyn JobStore>,
    pub tracking: Arc<dyn TrackingStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

/// Admission rule for retries, shared by the handler and the admin API.
///
/// A book without a job row has used no attempts.
pub fn evaluate_retry(
    job: Option<&ConversionJob>,
    default_max_attempts: u32,
    force: bool,
) -> RetryAdmission {
    let (attempts, max_attempts) = job
        .map(|j| (j.attempts, j.max_attempts))
        .unwrap_or((0, default_max_attempts));

    if attempts < max_attempts {
        RetryAdmission::Admitted {
            attempts,
            max_attempts,
        }
    } else if force {
        RetryAdmission::Forced {
            attempts,
            max_attempts,
        }
    } else {
        RetryAdmission::Rejected {
            attempts,
            max_attempts,
        }
    }
}

struct DurationCheck {
    probe: Arc<dyn DurationProbe>,
    tolerance_percent: f64,
}

/// Everything known about one run of one book.
struct RunContext<'a> {
    book_name: &'a str,
    catalog_item_id: Option<i64>,
    source_path: PathBuf,
    backup_path: Option<PathBuf>,
}

/// Drives books through the conversion pipeline.
pub struct ConversionOrchestrator {
    config: OrchestratorConfig,
    stores: PipelineStores,
    backups: Arc<BackupStore>,
    tool: Arc<dyn ConversionTool>,
    duration_check: Option<DurationCheck>,
    bus: Arc<dyn EventBus>,
    log_sink: LogSinkHandle,
    poll_timeout: Duration,

    // Runtime state
    running: AtomicBool,
    events_handled: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConversionOrchestrator {
    /// Create a new orchestrator. Duration validation is off until a probe
    /// is attached with [`with_duration_probe`](Self::with_duration_probe).
    pub fn new(
        config: OrchestratorConfig,
        stores: PipelineStores,
        backups: Arc<BackupStore>,
        tool: Arc<dyn ConversionTool>,
        bus: Arc<dyn EventBus>,
        log_sink: LogSinkHandle,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            stores,
            backups,
            tool,
            duration_check: None,
            bus,
            log_sink,
            poll_timeout: Duration::from_secs(1),
            running: AtomicBool::new(false),
            events_handled: AtomicU64::new(0),
            shutdown_tx,
        }
    }

    /// Compare source and output durations after every successful run.
    pub fn with_duration_probe(
        mut self,
        probe: Arc<dyn DurationProbe>,
        tolerance_percent: f64,
    ) -> Self {
        self.duration_check = Some(DurationCheck {
            probe,
            tolerance_percent,
        });
        self
    }

    /// How long one bus poll waits before checking for shutdown.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start the event loop on a background task.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move { orchestrator.run(shutdown_rx).await })
    }

    /// Signal the event loop started by [`start`](Self::start) to stop.
    ///
    /// A handler already running finishes first.
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            warn!("Orchestrator not running");
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Get current orchestrator status.
    pub fn status(&self) -> OrchestratorStatus {
        let count = |status: JobStatus| {
            let mut filter = JobFilter::new().with_status(status);
            filter.limit = i64::MAX;
            self.stores
                .jobs
                .list(&filter)
                .map(|jobs| jobs.len())
                .unwrap_or(0)
        };

        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            processing_count: count(JobStatus::Processing),
            failed_count: count(JobStatus::Failed),
            completed_count: count(JobStatus::Completed),
            events_handled: self.events_handled.load(Ordering::Relaxed),
        }
    }

    /// Consume inbound events until `shutdown_rx` fires.
    ///
    /// Messages are handled sequentially. Handler errors are logged and
    /// never end the loop. A broken subscription is re-established after
    /// `reconnect_delay_secs`.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }
        info!("Conversion orchestrator started on {} bus", self.bus.name());

        'subscribe: loop {
            let mut subscription = match self.bus.subscribe(&InboundEvent::channels()).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    error!("Failed to subscribe to pipeline events: {}", e);
                    if self.wait_or_shutdown(&mut shutdown_rx).await {
                        break;
                    }
                    continue;
                }
            };
            info!(
                "Subscribed to {} and {}",
                Channel::DownloadComplete,
                Channel::RetryConversion
            );

            loop {
                match shutdown_rx.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    _ => {
                        info!("Orchestrator received shutdown signal");
                        break 'subscribe;
                    }
                }

                match subscription.next_message(self.poll_timeout).await {
                    Ok(Some(message)) => self.handle_message(message).await,
                    Ok(None) => {}
                    Err(e) => {
                        error!("Event subscription failed: {}", e);
                        if self.wait_or_shutdown(&mut shutdown_rx).await {
                            break 'subscribe;
                        }
                        continue 'subscribe;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Conversion orchestrator stopped");
    }

    /// Sleep for the reconnect delay. Returns true if shutdown arrived first.
    async fn wait_or_shutdown(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = shutdown_rx.recv() => true,
            _ = tokio::time::sleep(Duration::from_secs(self.config.reconnect_delay_secs)) => false,
        }
    }

    /// Decode and handle one bus message. Malformed payloads are dropped.
    pub async fn handle_message(&self, message: BusMessage) {
        let event = match InboundEvent::parse(message.channel, &message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping message on {}: {}", message.channel, e);
                metrics::BUS_EVENTS
                    .with_label_values(&[message.channel.name(), "malformed"])
                    .inc();
                return;
            }
        };

        metrics::BUS_EVENTS
            .with_label_values(&[message.channel.name(), "consumed"])
            .inc();
        self.events_handled.fetch_add(1, Ordering::Relaxed);

        let book_name = event.book_name().to_string();
        match self.handle_event(event).await {
            Ok(outcome) => debug!("Handled event for {}: {:?}", book_name, outcome),
            Err(e) => {
                error!("Error handling event for {}: {}", book_name, e);
                self.log_sink
                    .error(format!("Error handling event for {}: {}", book_name, e));
            }
        }
    }

    pub async fn handle_event(
        &self,
        event: InboundEvent,
    ) -> Result<ConversionOutcome, OrchestratorError> {
        match event {
            InboundEvent::DownloadComplete(event) => self.handle_download_complete(&event).await,
            InboundEvent::RetryConversion(event) => self.handle_retry_conversion(&event).await,
        }
    }

    /// Back up the downloaded sources, then convert them.
    pub async fn handle_download_complete(
        &self,
        event: &DownloadComplete,
    ) -> Result<ConversionOutcome, OrchestratorError> {
        let book_name = event.book_name.as_str();
        info!("Processing download complete for: {}", book_name);
        self.log_sink
            .info(format!("Processing download complete for: {}", book_name));

        if self.is_processing(book_name)? {
            info!("Conversion already in progress for {}, skipping", book_name);
            return Ok(ConversionOutcome::SkippedInProgress);
        }

        let mut ctx = RunContext {
            book_name,
            catalog_item_id: self.resolve_catalog_item(book_name, event.catalog_item_id),
            source_path: PathBuf::from(&event.path),
            backup_path: None,
        };

        if !self.wait_for_source(&ctx.source_path).await {
            let message = format!("Source path not found: {}", ctx.source_path.display());
            return self.fail_before_conversion(&ctx, message).await;
        }

        let backup_path = match self.backups.create(book_name, &ctx.source_path).await {
            Ok(Some(path)) => {
                record_backup("create", "success");
                path
            }
            Ok(None) => {
                record_backup("create", "failure");
                let message = format!(
                    "Backup creation failed: source disappeared: {}",
                    ctx.source_path.display()
                );
                return self.fail_before_conversion(&ctx, message).await;
            }
            Err(e) => {
                record_backup("create", "failure");
                let message = format!("Backup creation failed: {}", e);
                return self.fail_before_conversion(&ctx, message).await;
            }
        };

        if let Some(id) = ctx.catalog_item_id {
            let pointer = backup_path.to_string_lossy();
            if let Err(e) = self.stores.catalog.set_backup_path(id, Some(pointer.as_ref())) {
                warn!("Failed to store backup pointer for {}: {}", book_name, e);
            }
        }
        ctx.backup_path = Some(backup_path);

        self.convert(&ctx).await
    }

    /// Restore the latest backup over the input folder and convert again.
    pub async fn handle_retry_conversion(
        &self,
        event: &RetryConversion,
    ) -> Result<ConversionOutcome, OrchestratorError> {
        let book_name = event.book_name.as_str();
        info!("Retrying conversion for: {}", book_name);
        self.log_sink
            .info(format!("Retrying conversion for: {}", book_name));

        let admission = self.admit_retry(book_name, event.force)?;
        metrics::RETRY_REQUESTS
            .with_label_values(&[admission.label()])
            .inc();
        match admission {
            RetryAdmission::Rejected {
                attempts,
                max_attempts,
            } => {
                warn!(
                    "Retry rejected for {}: {}/{} attempts used",
                    book_name, attempts, max_attempts
                );
                self.log_sink.warning(format!(
                    "Retry rejected for {}: {}/{} attempts used",
                    book_name, attempts, max_attempts
                ));
                return Ok(ConversionOutcome::RetryRejected {
                    attempts,
                    max_attempts,
                });
            }
            RetryAdmission::Forced {
                attempts,
                max_attempts,
            } => warn!(
                "Forcing retry for {} past its budget ({}/{} attempts)",
                book_name, attempts, max_attempts
            ),
            RetryAdmission::Admitted { .. } => {}
        }

        if self.is_processing(book_name)? {
            info!("Conversion already in progress for {}, skipping retry", book_name);
            return Ok(ConversionOutcome::SkippedInProgress);
        }

        let target = self.config.input_dir.join(book_name);
        let catalog_item_id = self.resolve_catalog_item(book_name, event.catalog_item_id);
        let mut ctx = RunContext {
            book_name,
            catalog_item_id,
            source_path: target.clone(),
            backup_path: None,
        };

        let Some(snapshot) = self.locate_backup(book_name, catalog_item_id)? else {
            return self.fail_without_backup(&ctx).await;
        };

        match self.backups.restore(&snapshot, &target).await {
            Ok(true) => record_backup("restore", "success"),
            Ok(false) => {
                record_backup("restore", "failure");
                return self.fail_without_backup(&ctx).await;
            }
            Err(e) => {
                record_backup("restore", "failure");
                let message = format!("Restore failed: {}", e);
                error!("{} ({})", message, book_name);
                self.record_transition(&ctx, JobTransition::failed(book_name, &message))?;
                return Err(e.into());
            }
        }
        info!("Restored {} to {}", snapshot.display(), target.display());
        ctx.backup_path = Some(snapshot);

        self.convert(&ctx).await
    }

    /// Whether a retry of `book_name` may run now.
    pub fn admit_retry(
        &self,
        book_name: &str,
        force: bool,
    ) -> Result<RetryAdmission, OrchestratorError> {
        let job = self.stores.jobs.get(book_name)?;
        Ok(evaluate_retry(job.as_ref(), self.config.max_attempts, force))
    }

    fn is_processing(&self, book_name: &str) -> Result<bool, OrchestratorError> {
        Ok(self
            .stores
            .jobs
            .get(book_name)?
            .is_some_and(|job| job.status == JobStatus::Processing))
    }

    /// Use the id from the event, else look the book up by title.
    fn resolve_catalog_item(&self, book_name: &str, given: Option<i64>) -> Option<i64> {
        if given.is_some() {
            return given;
        }
        match resolve_identity(self.stores.catalog.as_ref(), book_name) {
            Ok(Some(id)) => {
                info!("Resolved {} to catalog item {}", book_name, id);
                Some(id)
            }
            Ok(None) => {
                warn!("Could not find catalog item for: {}", book_name);
                None
            }
            Err(e) => {
                warn!("Catalog lookup failed for {}: {}", book_name, e);
                None
            }
        }
    }

    /// Check once, wait once, check again.
    async fn wait_for_source(&self, source_path: &Path) -> bool {
        if source_path.exists() {
            return true;
        }
        warn!(
            "Source path not found: {}, waiting {}s",
            source_path.display(),
            self.config.source_wait_secs
        );
        tokio::time::sleep(Duration::from_secs(self.config.source_wait_secs)).await;
        source_path.exists()
    }

    /// Stored pointer first, then the newest snapshot matching the name.
    fn locate_backup(
        &self,
        book_name: &str,
        catalog_item_id: Option<i64>,
    ) -> Result<Option<PathBuf>, OrchestratorError> {
        if let Some(id) = catalog_item_id {
            let pointer = self
                .stores
                .catalog
                .get(id)?
                .and_then(|item| item.conversion_backup_path);
            if let Some(pointer) = pointer {
                let path = PathBuf::from(pointer);
                if path.is_dir() {
                    return Ok(Some(path));
                }
                warn!(
                    "Backup pointer for {} does not exist: {}",
                    book_name,
                    path.display()
                );
            }
        }
        Ok(self.backups.find_latest(book_name)?)
    }

    /// Run the tool against `ctx.source_path` and record the result.
    async fn convert(&self, ctx: &RunContext<'_>) -> Result<ConversionOutcome, OrchestratorError> {
        let book_name = ctx.book_name;
        let job = self.record_transition(ctx, JobTransition::processing(book_name))?;
        info!(
            "Starting conversion for {} (attempt {}/{})",
            book_name, job.attempts, job.max_attempts
        );

        let sources = find_source_files(&ctx.source_path, &MarkerProtocol::V1);
        let total_files = sources.len() as u32;
        self.upsert_tracking(
            TrackingUpdate::new(book_name, TrackingStatus::Converting)
                .with_files(0, total_files)
                .with_current_file(STARTING_LABEL),
        );

        let source_duration = match &self.duration_check {
            Some(check) => total_duration(check.probe.as_ref(), &sources).await,
            None => None,
        };

        let request = InvocationRequest::new(&ctx.source_path, &self.config.output_dir, book_name);
        let started = Instant::now();
        let invoked = self.tool.invoke(&request).await;
        let elapsed = started.elapsed().as_secs_f64();

        match invoked {
            Ok(result) => {
                metrics::CONVERSION_DURATION
                    .with_label_values(&["completed"])
                    .observe(elapsed);
                self.complete(ctx, total_files, source_duration, result)
                    .await
            }
            Err(e) => {
                metrics::CONVERSION_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed);
                self.fail_conversion(ctx, total_files, e.to_string()).await
            }
        }
    }

    async fn complete(
        &self,
        ctx: &RunContext<'_>,
        total_files: u32,
        source_duration: Option<f64>,
        result: InvocationResult,
    ) -> Result<ConversionOutcome, OrchestratorError> {
        let book_name = ctx.book_name;
        let report = self
            .duration_report(book_name, source_duration, &result.output_path)
            .await;

        self.record_transition(ctx, JobTransition::completed(book_name))?;
        self.stores.jobs.record_durations(book_name, &report)?;
        self.upsert_tracking(
            TrackingUpdate::new(book_name, TrackingStatus::Completed)
                .with_files(total_files, total_files),
        );

        if let Some(id) = ctx.catalog_item_id {
            match self.stores.catalog.increment_conversion_attempts(id) {
                Ok(count) => debug!("Catalog item {} has {} conversions", id, count),
                Err(e) => warn!("Failed to count conversion for item {}: {}", id, e),
            }
            match self.backups.retention_cleanup(id).await {
                Ok(true) => record_backup("retention", "success"),
                Ok(false) => {}
                Err(e) => {
                    record_backup("retention", "failure");
                    warn!("Retention cleanup failed for item {}: {}", id, e);
                }
            }
        }

        metrics::CONVERSIONS_TOTAL
            .with_label_values(&["completed"])
            .inc();
        info!(
            "Conversion completed successfully: {} -> {} ({} bytes in {}ms)",
            book_name,
            result.output_path.display(),
            result.output_size_bytes,
            result.elapsed_ms
        );
        self.log_sink
            .info(format!("Conversion completed successfully: {}", book_name));

        let event = ConversionComplete::new(book_name, ctx.catalog_item_id);
        match publish_event(self.bus.as_ref(), Channel::ConversionComplete, &event).await {
            Ok(()) => info!("Published conversion complete event for: {}", book_name),
            Err(e) => error!("Failed to publish completion for {}: {}", book_name, e),
        }

        Ok(ConversionOutcome::Completed {
            output_path: result.output_path,
            validation_passed: report.validation_passed,
        })
    }

    /// A validation mismatch is reported but does not fail the job.
    async fn duration_report(
        &self,
        book_name: &str,
        source_duration: Option<f64>,
        output_path: &Path,
    ) -> DurationReport {
        let Some(check) = &self.duration_check else {
            return DurationReport::default();
        };

        let converted = match check.probe.duration(output_path).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!("Could not get duration of {}: {}", output_path.display(), e);
                None
            }
        };

        let (Some(source), Some(converted_secs)) = (source_duration, converted) else {
            metrics::DURATION_VALIDATIONS
                .with_label_values(&["skipped"])
                .inc();
            warn!("Skipping duration validation for {}", book_name);
            return DurationReport {
                source_total_seconds: source_duration,
                converted_seconds: converted,
                validation_passed: None,
            };
        };

        let validation = validate_duration(source, converted_secs, check.tolerance_percent);
        if validation.passed {
            metrics::DURATION_VALIDATIONS
                .with_label_values(&["passed"])
                .inc();
            info!("{}: {}", book_name, validation.message);
        } else {
            metrics::DURATION_VALIDATIONS
                .with_label_values(&["failed"])
                .inc();
            warn!("{}: {}", book_name, validation.message);
            self.log_sink
                .warning(format!("{}: {}", book_name, validation.message));
        }

        DurationReport {
            source_total_seconds: Some(source),
            converted_seconds: Some(converted_secs),
            validation_passed: Some(validation.passed),
        }
    }

    /// Record a tool failure. The backup is left in place for a retry.
    async fn fail_conversion(
        &self,
        ctx: &RunContext<'_>,
        total_files: u32,
        error_message: String,
    ) -> Result<ConversionOutcome, OrchestratorError> {
        let book_name = ctx.book_name;
        error!("Conversion failed for {}: {}", book_name, error_message);
        self.record_transition(ctx, JobTransition::failed(book_name, &error_message))?;

        let converted = self
            .stores
            .tracking
            .get(book_name)
            .ok()
            .flatten()
            .map(|row| row.converted_files)
            .unwrap_or(0);
        self.upsert_tracking(
            TrackingUpdate::new(book_name, TrackingStatus::Failed)
                .with_files(converted, total_files),
        );

        metrics::CONVERSIONS_TOTAL.with_label_values(&["failed"]).inc();
        self.publish_failed(ctx, &error_message).await;
        Ok(ConversionOutcome::Failed { error_message })
    }

    /// Failure before the tool ran: no tracking row, the event is still published.
    async fn fail_before_conversion(
        &self,
        ctx: &RunContext<'_>,
        error_message: String,
    ) -> Result<ConversionOutcome, OrchestratorError> {
        error!("{} ({})", error_message, ctx.book_name);
        self.record_transition(ctx, JobTransition::failed(ctx.book_name, &error_message))?;
        metrics::CONVERSIONS_TOTAL.with_label_values(&["failed"]).inc();
        self.publish_failed(ctx, &error_message).await;
        Ok(ConversionOutcome::Failed { error_message })
    }

    /// Terminal retry failure. Nothing is published.
    async fn fail_without_backup(
        &self,
        ctx: &RunContext<'_>,
    ) -> Result<ConversionOutcome, OrchestratorError> {
        error!("No backup found for retry: {}", ctx.book_name);
        metrics::RETRY_REQUESTS
            .with_label_values(&["no_backup"])
            .inc();
        self.record_transition(
            ctx,
            JobTransition::failed(ctx.book_name, "No backup found for retry"),
        )?;
        Err(OrchestratorError::BackupMissing(ctx.book_name.to_string()))
    }

    async fn publish_failed(&self, ctx: &RunContext<'_>, error_message: &str) {
        let event = ConversionFailed::new(ctx.book_name, ctx.catalog_item_id, error_message);
        match publish_event(self.bus.as_ref(), Channel::ConversionFailed, &event).await {
            Ok(()) => info!("Published conversion failed event for: {}", ctx.book_name),
            Err(e) => error!("Failed to publish failure for {}: {}", ctx.book_name, e),
        }
    }

    /// Upsert the job row and mirror the transition to the log sink.
    fn record_transition(
        &self,
        ctx: &RunContext<'_>,
        transition: JobTransition,
    ) -> Result<ConversionJob, OrchestratorError> {
        let mut transition = transition
            .with_catalog_item(ctx.catalog_item_id)
            .with_source_path(ctx.source_path.to_string_lossy())
            .with_max_attempts(self.config.max_attempts);
        if let Some(backup) = &ctx.backup_path {
            transition = transition.with_backup_path(backup.to_string_lossy());
        }

        let job = self.stores.jobs.transition(&transition)?;

        let level = match job.status {
            JobStatus::Failed => LogLevel::Error,
            _ => LogLevel::Info,
        };
        let mut message = format!(
            "Job {} is {} (attempt {}/{})",
            job.book_name, job.status, job.attempts, job.max_attempts
        );
        if let Some(error) = &job.error_message {
            message.push_str(": ");
            message.push_str(error);
        }
        self.log_sink.send(level, message);

        Ok(job)
    }

    /// Tracking rows are advisory. A write failure never fails the job.
    fn upsert_tracking(&self, update: TrackingUpdate) {
        if let Err(e) = self.stores.tracking.upsert(&update) {
            warn!(
                "Failed to update tracking for {}: {}",
                update.book_name, e
            );
        }
    }
}

fn record_backup(operation: &str, result: &str) {
    metrics::BACKUP_OPERATIONS
        .with_label_values(&[operation, result])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterError;
    use crate::testing::TestPipeline;
    use tempfile::TempDir;

    fn job(attempts: u32, max_attempts: u32) -> ConversionJob {
        let now = chrono::Utc::now();
        ConversionJob {
            id: 1,
            catalog_item_id: None,
            book_name: "Dune".to_string(),
            source_path: "/input/Dune".to_string(),
            backup_path: None,
            status: JobStatus::Failed,
            attempts,
            max_attempts,
            started_at: None,
            completed_at: None,
            error_message: None,
            source_total_duration_seconds: None,
            converted_duration_seconds: None,
            duration_validation_passed: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_evaluate_retry() {
        assert_eq!(
            evaluate_retry(None, 3, false),
            RetryAdmission::Admitted {
                attempts: 0,
                max_attempts: 3
            }
        );
        assert!(evaluate_retry(Some(&job(2, 3)), 3, false).is_allowed());
        assert_eq!(
            evaluate_retry(Some(&job(3, 3)), 3, false),
            RetryAdmission::Rejected {
                attempts: 3,
                max_attempts: 3
            }
        );
        assert_eq!(
            evaluate_retry(Some(&job(3, 3)), 3, true).label(),
            "forced"
        );
    }

    #[tokio::test]
    async fn test_download_complete_success() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let item = pipeline.catalog.insert("Dune").unwrap();
        let source = pipeline.write_source("Dune", 3).unwrap();
        let orchestrator = pipeline.orchestrator();

        let outcome = orchestrator
            .handle_download_complete(&DownloadComplete {
                book_name: "Dune".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();
        assert!(outcome.is_completed());

        let job = pipeline.jobs.get("Dune").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.catalog_item_id, Some(item.id));
        assert!(job.backup_path.is_some());

        let tracking = pipeline.tracking.get("Dune").unwrap().unwrap();
        assert_eq!(tracking.status, TrackingStatus::Completed);
        assert_eq!(tracking.total_files, 3);
        assert_eq!(tracking.progress_percentage, 100.0);

        let item = pipeline.catalog.get(item.id).unwrap().unwrap();
        assert_eq!(item.conversion_attempts, 1);
        assert_eq!(item.conversion_backup_path, job.backup_path);

        let events: Vec<ConversionComplete> =
            pipeline.bus.published_on(Channel::ConversionComplete);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].catalog_item_id, Some(item.id));
    }

    #[tokio::test]
    async fn test_tool_failure_keeps_backup() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let source = pipeline.write_source("Dune", 2).unwrap();
        pipeline
            .tool
            .set_next_error(ConverterError::tool_failed(Some(1), "bad frame"))
            .await;
        let orchestrator = pipeline.orchestrator();

        let outcome = orchestrator
            .handle_download_complete(&DownloadComplete {
                book_name: "Dune".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();

        let ConversionOutcome::Failed { error_message } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(error_message.contains("bad frame"));

        let job = pipeline.jobs.get("Dune").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(error_message.as_str()));
        assert_eq!(pipeline.backups.find_all("Dune").unwrap().len(), 1);
        assert_eq!(
            pipeline.tracking.get("Dune").unwrap().unwrap().status,
            TrackingStatus::Failed
        );

        let failed: Vec<ConversionFailed> = pipeline.bus.published_on(Channel::ConversionFailed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message, error_message);
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_invoking() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let orchestrator = pipeline.orchestrator();

        let outcome = orchestrator
            .handle_download_complete(&DownloadComplete {
                book_name: "Ghost".to_string(),
                path: temp.path().join("nowhere").to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();

        assert!(matches!(outcome, ConversionOutcome::Failed { .. }));
        assert_eq!(pipeline.tool.invocation_count().await, 0);
        let job = pipeline.jobs.get("Ghost").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 0);
        assert_eq!(
            pipeline
                .bus
                .published_on::<ConversionFailed>(Channel::ConversionFailed)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_source_appearing_during_wait_is_converted() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = TestPipeline::new(temp.path()).unwrap();
        pipeline.config.source_wait_secs = 1;
        let orchestrator = pipeline.orchestrator();
        let source = pipeline.config.input_dir.join("Late");

        let writer = {
            let source = source.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                crate::testing::fixtures::write_source_files(&source, 2).unwrap();
            })
        };

        let outcome = orchestrator
            .handle_download_complete(&DownloadComplete {
                book_name: "Late".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();
        writer.await.unwrap();

        assert!(outcome.is_completed(), "got {outcome:?}");
        assert_eq!(pipeline.tool.invocation_count().await, 1);
        let job = pipeline.jobs.get("Late").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_skips_book_already_processing() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let source = pipeline.write_source("Dune", 1).unwrap();
        pipeline
            .jobs
            .transition(&JobTransition::processing("Dune").with_source_path("/input/Dune"))
            .unwrap();

        let outcome = pipeline
            .orchestrator()
            .handle_download_complete(&DownloadComplete {
                book_name: "Dune".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome, ConversionOutcome::SkippedInProgress);
        assert_eq!(pipeline.tool.invocation_count().await, 0);
        assert!(pipeline.backups.find_all("Dune").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_rejected_over_budget() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        for _ in 0..3 {
            pipeline
                .jobs
                .transition(&JobTransition::processing("Dune").with_max_attempts(3))
                .unwrap();
        }
        let before = pipeline
            .jobs
            .transition(&JobTransition::failed("Dune", "boom"))
            .unwrap();

        let outcome = pipeline
            .orchestrator()
            .handle_retry_conversion(&RetryConversion {
                book_name: "Dune".to_string(),
                catalog_item_id: None,
                conversion_tracking_id: None,
                force: false,
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ConversionOutcome::RetryRejected {
                attempts: 3,
                max_attempts: 3
            }
        );
        assert_eq!(pipeline.jobs.get("Dune").unwrap().unwrap(), before);
        assert_eq!(pipeline.tool.invocation_count().await, 0);
        assert!(pipeline.bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_retry_without_backup_is_terminal() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();

        let result = pipeline
            .orchestrator()
            .handle_retry_conversion(&RetryConversion {
                book_name: "Dune".to_string(),
                catalog_item_id: None,
                conversion_tracking_id: None,
                force: false,
            })
            .await;

        assert!(matches!(result, Err(OrchestratorError::BackupMissing(_))));
        let job = pipeline.jobs.get("Dune").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("No backup found for retry"));
        assert!(pipeline.bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_retry_restores_and_converts() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let source = pipeline.write_source("Dune", 2).unwrap();
        pipeline
            .tool
            .set_next_error(ConverterError::Timeout { timeout_secs: 1 })
            .await;
        let orchestrator = pipeline.orchestrator();

        let first = orchestrator
            .handle_download_complete(&DownloadComplete {
                book_name: "Dune".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();
        assert!(matches!(first, ConversionOutcome::Failed { .. }));

        // Input is gone, only the snapshot remains.
        std::fs::remove_dir_all(&source).unwrap();

        let outcome = orchestrator
            .handle_retry_conversion(&RetryConversion {
                book_name: "Dune".to_string(),
                catalog_item_id: None,
                conversion_tracking_id: None,
                force: false,
            })
            .await
            .unwrap();
        assert!(outcome.is_completed());

        let restored = pipeline.config.input_dir.join("Dune");
        assert_eq!(find_source_files(&restored, &MarkerProtocol::V1).len(), 2);
        let job = pipeline.jobs.get("Dune").unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.status, JobStatus::Completed);
        let requests = pipeline.tool.invocations().await;
        assert_eq!(requests.last().unwrap().input_dir, restored);
    }

    #[tokio::test]
    async fn test_duration_validation_recorded() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let source = pipeline.write_source("Dune", 2).unwrap();
        pipeline.probe.set_default_duration(600.0).await;
        pipeline
            .probe
            .set_duration(pipeline.config.output_dir.join("Dune.m4b"), 1190.0)
            .await;
        let orchestrator = pipeline
            .orchestrator()
            .with_duration_probe(pipeline.probe.clone(), 5.0);

        let outcome = orchestrator
            .handle_download_complete(&DownloadComplete {
                book_name: "Dune".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ConversionOutcome::Completed {
                output_path: pipeline.config.output_dir.join("Dune.m4b"),
                validation_passed: Some(true),
            }
        );
        let job = pipeline.jobs.get("Dune").unwrap().unwrap();
        assert_eq!(job.source_total_duration_seconds, Some(1200.0));
        assert_eq!(job.converted_duration_seconds, Some(1190.0));
        assert_eq!(job.duration_validation_passed, Some(true));
    }

    #[tokio::test]
    async fn test_event_loop_handles_and_stops() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let source = pipeline.write_source("Dune", 1).unwrap();
        let bus = pipeline.bus.clone();
        let orchestrator = Arc::new(
            pipeline
                .orchestrator()
                .with_poll_timeout(Duration::from_millis(20)),
        );

        let handle = orchestrator.start();
        // Let the loop subscribe before publishing.
        tokio::time::sleep(Duration::from_millis(50)).await;

        bus.publish(Channel::DownloadComplete, "not json").await.unwrap();
        publish_event(
            bus.as_ref(),
            Channel::DownloadComplete,
            &DownloadComplete {
                book_name: "Dune".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            },
        )
        .await
        .unwrap();

        let mut completed = false;
        for _ in 0..100 {
            if !bus
                .published_on::<ConversionComplete>(Channel::ConversionComplete)
                .is_empty()
            {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(completed);
        assert_eq!(orchestrator.status().events_handled, 1);
        assert_eq!(orchestrator.status().completed_count, 1);

        orchestrator.stop();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!orchestrator.status().running);
    }

    #[tokio::test]
    async fn test_unlinked_book_is_still_converted() {
        let temp = TempDir::new().unwrap();
        let pipeline = TestPipeline::new(temp.path()).unwrap();
        let source = pipeline.write_source("Unknown Title", 1).unwrap();

        let outcome = pipeline
            .orchestrator()
            .handle_download_complete(&DownloadComplete {
                book_name: "Unknown Title".to_string(),
                path: source.to_string_lossy().into_owned(),
                catalog_item_id: None,
            })
            .await
            .unwrap();

        assert!(outcome.is_completed());
        let job = pipeline.jobs.get("Unknown Title").unwrap().unwrap();
        assert_eq!(job.catalog_item_id, None);
    }
}
