//! Admin API integration tests.
//!
//! Every request goes through the full router (metrics middleware, trace
//! layer, state extraction) against in-memory stores.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use bookbinder_core::{
    bus::{Channel, RetryConversion},
    jobs::{JobStore, JobTransition},
    tracking::{TrackingStatus, TrackingStore, TrackingUpdate},
};
use common::TestFixture;

/// Give `book_name` a failed job with `attempts` used out of `max_attempts`.
fn failed_job(fixture: &TestFixture, book_name: &str, attempts: u32, max_attempts: u32) {
    let jobs = &fixture.pipeline.jobs;
    for _ in 0..attempts {
        jobs.transition(&JobTransition::processing(book_name).with_max_attempts(max_attempts))
            .unwrap();
    }
    jobs.transition(&JobTransition::failed(book_name, "Conversion tool exited with code 1"))
        .unwrap();
}

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();

    let response = fixture.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "Dune", 1, 3);
    fixture.get("/api/v1/jobs").await;

    let response = fixture.get("/metrics").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("# TYPE bookbinder_http_requests_total counter"));
    assert!(response.text.contains("bookbinder_orchestrator_running"));
    assert!(response
        .text
        .contains(r#"bookbinder_jobs_by_status{status="failed"}"#));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/nope").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Jobs
// =============================================================================

#[tokio::test]
async fn test_list_jobs_empty() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/jobs").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total"], 0);
    assert_eq!(response.body["limit"], 100);
    assert_eq!(response.body["jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_list_jobs_filters_by_status() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "Dune", 1, 3);
    fixture
        .pipeline
        .jobs
        .transition(&JobTransition::processing("Emma"))
        .unwrap();

    let response = fixture.get("/api/v1/jobs?status=failed").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["jobs"][0]["book_name"], "Dune");
    assert_eq!(response.body["jobs"][0]["status"], "failed");

    let all = fixture.get("/api/v1/jobs?limit=1").await;
    assert_eq!(all.body["total"], 2);
    assert_eq!(all.body["jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_jobs_rejects_unknown_status() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/jobs?status=exploded").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("exploded"));
}

#[tokio::test]
async fn test_get_job() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "Dune", 2, 3);

    let response = fixture.get("/api/v1/jobs/Dune").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["attempts"], 2);
    assert_eq!(response.body["max_attempts"], 3);
    assert_eq!(
        response.body["error_message"],
        "Conversion tool exited with code 1"
    );
}

#[tokio::test]
async fn test_get_job_not_found() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/jobs/Missing").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "Job not found: Missing");
}

#[tokio::test]
async fn test_get_job_with_spaces_in_name() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "The Left Hand of Darkness", 1, 3);

    let response = fixture
        .get("/api/v1/jobs/The%20Left%20Hand%20of%20Darkness")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["book_name"], "The Left Hand of Darkness");
}

#[tokio::test]
async fn test_cancel_job() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "Dune", 1, 3);

    let response = fixture.post_empty("/api/v1/jobs/Dune/cancel").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "cancelled");
    assert_eq!(response.body["attempts"], 1);

    let missing = fixture.post_empty("/api/v1/jobs/Missing/cancel").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_retry_publishes_event() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "Dune", 1, 3);
    fixture
        .pipeline
        .tracking
        .upsert(&TrackingUpdate::new("Dune", TrackingStatus::Failed).with_files(2, 5))
        .unwrap();
    let tracking_id = fixture.pipeline.tracking.get("Dune").unwrap().unwrap().id;

    let response = fixture.post_empty("/api/v1/jobs/Dune/retry").await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["book_name"], "Dune");
    assert_eq!(response.body["admission"]["decision"], "admitted");

    let published: Vec<RetryConversion> =
        fixture.pipeline.bus.published_on(Channel::RetryConversion);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].book_name, "Dune");
    assert_eq!(published[0].conversion_tracking_id, Some(tracking_id));
    assert!(!published[0].force);
}

#[tokio::test]
async fn test_retry_rejected_when_budget_exhausted() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "Dune", 3, 3);

    let response = fixture.post("/api/v1/jobs/Dune/retry", json!({})).await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("attempts 3/3"));
    assert!(fixture
        .pipeline
        .bus
        .published_on::<RetryConversion>(Channel::RetryConversion)
        .is_empty());

    // Nothing about the job changed.
    let job = fixture.pipeline.jobs.get("Dune").unwrap().unwrap();
    assert_eq!(job.attempts, 3);
}

#[tokio::test]
async fn test_forced_retry_bypasses_budget() {
    let fixture = TestFixture::new();
    failed_job(&fixture, "Dune", 3, 3);

    let response = fixture
        .post("/api/v1/jobs/Dune/retry", json!({ "force": true }))
        .await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["admission"]["decision"], "forced");

    let published: Vec<RetryConversion> =
        fixture.pipeline.bus.published_on(Channel::RetryConversion);
    assert_eq!(published.len(), 1);
    assert!(published[0].force);
}

#[tokio::test]
async fn test_retry_for_unknown_book_is_admitted() {
    let fixture = TestFixture::new();

    let response = fixture.post_empty("/api/v1/jobs/Ghost/retry").await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["admission"]["attempts"], 0);
    assert_eq!(
        response.body["admission"]["max_attempts"],
        fixture.pipeline.config.max_attempts
    );
}

// =============================================================================
// Backups
// =============================================================================

#[tokio::test]
async fn test_list_backups() {
    let fixture = TestFixture::new();

    let empty = fixture.get("/api/v1/backups").await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.body["backups"].as_array().unwrap().len(), 0);

    fixture.make_snapshot("Dune_20240101_120000");
    let response = fixture.get("/api/v1/backups").await;

    assert_eq!(response.status, StatusCode::OK);
    let backups = response.body["backups"].as_array().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0]["name"], "Dune_20240101_120000");
    assert_eq!(backups[0]["size"], 3);
}

#[tokio::test]
async fn test_delete_backup() {
    let fixture = TestFixture::new();
    let snapshot = fixture.make_snapshot("Dune_20240101_120000");

    let response = fixture.delete("/api/v1/backups/Dune_20240101_120000").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["deleted"], "Dune_20240101_120000");
    assert!(!snapshot.exists());

    let again = fixture.delete("/api/v1/backups/Dune_20240101_120000").await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_backup_refuses_nested_names() {
    let fixture = TestFixture::new();
    fixture.make_snapshot("Dune_20240101_120000");

    let response = fixture
        .delete("/api/v1/backups/Dune_20240101_120000%2F01.mp3")
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(fixture
        .pipeline
        .backups
        .backup_dir()
        .join("Dune_20240101_120000")
        .join("01.mp3")
        .exists());
}

#[tokio::test]
async fn test_release_backup_after_downstream_success() {
    let fixture = TestFixture::new();
    let snapshot = fixture.make_snapshot("Dune_20240101_120000");
    let output_dir = &fixture.pipeline.config.output_dir;
    std::fs::create_dir_all(output_dir).unwrap();
    std::fs::write(output_dir.join("Dune.m4b"), b"m4b").unwrap();

    let response = fixture.post_empty("/api/v1/backups/Dune/release").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(!response.body["snapshot_removed"].is_null());
    assert!(!response.body["output_removed"].is_null());
    assert_eq!(response.body["pointer_cleared"], false);
    assert!(!snapshot.exists());
    assert!(!output_dir.join("Dune.m4b").exists());
}

#[tokio::test]
async fn test_release_without_backup_is_ok() {
    let fixture = TestFixture::new();

    let response = fixture
        .post("/api/v1/backups/Dune/release", json!({ "catalog_item_id": null }))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["snapshot_removed"].is_null());
    assert!(response.body["output_removed"].is_null());
}

// =============================================================================
// Tracking
// =============================================================================

#[tokio::test]
async fn test_list_tracking_filters_by_status() {
    let fixture = TestFixture::new();
    let tracking = &fixture.pipeline.tracking;
    tracking
        .upsert(
            &TrackingUpdate::new("Dune", TrackingStatus::Converting)
                .with_files(7, 10)
                .with_current_file("08.mp3"),
        )
        .unwrap();
    tracking
        .upsert(&TrackingUpdate::new("Emma", TrackingStatus::Completed).with_files(4, 4))
        .unwrap();

    let response = fixture
        .get("/api/v1/tracking?status=pending,converting")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let rows = response.body["tracking"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["book_name"], "Dune");
    assert_eq!(rows[0]["converted_files"], 7);
    let percentage = rows[0]["progress_percentage"].as_f64().unwrap();
    assert!((percentage - 70.0).abs() < 1e-9);
    assert_eq!(rows[0]["current_file"], "08.mp3");

    let all = fixture.get("/api/v1/tracking").await;
    assert_eq!(all.body["tracking"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_tracking_rejects_unknown_status() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/tracking?status=converting,melting").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
