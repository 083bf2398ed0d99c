//! Common test utilities for admin API testing.
//!
//! This module provides a test fixture that builds the admin router over an
//! in-memory pipeline, so handlers can be driven with `oneshot` requests
//! without Redis, ffprobe or the conversion tool.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use bookbinder_core::{testing::TestPipeline, Config};
use bookbinder_server::state::AppState;

/// Test fixture for admin API tests.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_list_jobs() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.get("/api/v1/jobs").await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Stores, backups and bus behind the router
    pub pipeline: TestPipeline,
    /// Scratch root holding input/, output/ and backups/
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pipeline = TestPipeline::new(temp_dir.path()).expect("Failed to build pipeline");

        let mut config = Config::default();
        config.orchestrator = pipeline.config.clone();

        let state = Arc::new(AppState::new(
            config,
            pipeline.jobs.clone(),
            pipeline.tracking.clone(),
            pipeline.backups.clone(),
            Arc::new(pipeline.orchestrator()),
            pipeline.bus.clone(),
        ));
        let router = bookbinder_server::api::create_router(state);

        Self {
            router,
            pipeline,
            temp_dir,
        }
    }

    /// Create a snapshot directory named `name` holding one file.
    pub fn make_snapshot(&self, name: &str) -> std::path::PathBuf {
        let dir = self.pipeline.backups.backup_dir().join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create snapshot dir");
        std::fs::write(dir.join("01.mp3"), b"mp3").expect("Failed to write snapshot file");
        dir
    }

    /// Send a GET request to the test router.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
