//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the converter service:
//! - HTTP request metrics (latency, counts, in flight)
//! - Orchestrator status and job counts (collected dynamically)
//! - Backup snapshots on disk (collected dynamically)
//!
//! Core metrics (conversions, retries, backup operations, bus events) are
//! registered here too so one scrape covers the whole process.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use bookbinder_core::{JobFilter, JobStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bookbinder_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookbinder_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bookbinder_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics (collected dynamically)
// =============================================================================

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bookbinder_orchestrator_running",
        "Whether the orchestrator event loop is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Conversion jobs by current status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("bookbinder_jobs_by_status", "Current conversion job count by status"),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Backup Metrics (collected dynamically)
// =============================================================================

/// Snapshot directories currently on disk.
pub static BACKUPS_ON_DISK: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bookbinder_backups_on_disk",
        "Number of backup snapshots in the backup directory",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Orchestrator
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(JOBS_BY_STATUS.clone()))
        .unwrap();

    // Backups
    registry
        .register(Box::new(BACKUPS_ON_DISK.clone()))
        .unwrap();

    // Core metrics (conversions, retries, backups, bus)
    for metric in bookbinder_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the stores at scrape time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    ORCHESTRATOR_RUNNING.set(if state.orchestrator().status().running {
        1
    } else {
        0
    });

    for status in [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ] {
        let mut filter = JobFilter::new().with_status(status);
        filter.limit = i64::MAX;
        if let Ok(jobs) = state.jobs().list(&filter) {
            JOBS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(jobs.len() as i64);
        }
    }

    if let Ok(backups) = state.backups().list() {
        BACKUPS_ON_DISK.set(backups.len() as i64);
    }
}
