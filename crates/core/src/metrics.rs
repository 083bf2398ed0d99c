//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (conversions, retries, backups)
//! - Progress inferencer (scans)
//! - Event bus (published/consumed events)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Orchestrator - Conversion Metrics
// =============================================================================

/// Conversions total by result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookbinder_conversions_total", "Total conversion runs"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

/// Wall-clock duration of a conversion tool run.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bookbinder_conversion_duration_seconds",
            "Duration of conversion tool runs",
        )
        .buckets(vec![
            10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0, 7200.0,
        ]),
        &["result"],
    )
    .unwrap()
});

/// Duration validation outcomes after successful conversions.
pub static DURATION_VALIDATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bookbinder_duration_validations_total",
            "Duration validation outcomes",
        ),
        &["result"], // "passed", "failed", "skipped"
    )
    .unwrap()
});

/// Retry requests by admission result.
pub static RETRY_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookbinder_retry_requests_total", "Retry conversion requests"),
        &["result"], // "admitted", "forced", "rejected", "no_backup"
    )
    .unwrap()
});

// =============================================================================
// Backup Metrics
// =============================================================================

/// Backup operations by kind and result.
pub static BACKUP_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookbinder_backup_operations_total", "Backup store operations"),
        &["operation", "result"], // operation: "create", "restore", "release", "retention"
    )
    .unwrap()
});

// =============================================================================
// Progress Metrics
// =============================================================================

/// Full staging rescans performed.
pub static PROGRESS_SCANS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bookbinder_progress_scans_total",
        "Full rescans of the staging directories",
    )
    .unwrap()
});

// =============================================================================
// Event Bus Metrics
// =============================================================================

/// Events by channel and direction.
pub static BUS_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookbinder_bus_events_total", "Pipeline events seen on the bus"),
        &["channel", "direction"], // direction: "published", "consumed", "malformed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(DURATION_VALIDATIONS.clone()),
        Box::new(RETRY_REQUESTS.clone()),
        // Backups
        Box::new(BACKUP_OPERATIONS.clone()),
        // Progress
        Box::new(PROGRESS_SCANS.clone()),
        // Bus
        Box::new(BUS_EVENTS.clone()),
    ]
}
