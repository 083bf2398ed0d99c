//! Orchestrator lifecycle integration tests.
//!
//! These tests drive the event loop through the in-process bus:
//! start -> consume events -> publish results -> stop

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use bookbinder_core::{
    bus::{
        publish_event, Channel, ConversionComplete, ConversionFailed, DownloadComplete, EventBus,
        RetryConversion,
    },
    converter::ConverterError,
    jobs::{JobStatus, JobStore},
    testing::TestPipeline,
    ConversionOrchestrator,
};

/// Test helper to create a running orchestrator over a scratch pipeline.
struct TestHarness {
    pipeline: TestPipeline,
    orchestrator: Arc<ConversionOrchestrator>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pipeline = TestPipeline::new(temp_dir.path()).expect("Failed to build pipeline");
        let orchestrator = Arc::new(
            pipeline
                .orchestrator()
                .with_poll_timeout(Duration::from_millis(20)),
        );

        Self {
            pipeline,
            orchestrator,
            _temp_dir: temp_dir,
        }
    }

    async fn download(&self, book_name: &str, files: usize) {
        let path = self
            .pipeline
            .write_source(book_name, files)
            .expect("write sources");
        publish_event(
            self.pipeline.bus.as_ref(),
            Channel::DownloadComplete,
            &DownloadComplete {
                book_name: book_name.to_string(),
                path: path.to_string_lossy().into_owned(),
                catalog_item_id: None,
            },
        )
        .await
        .expect("publish download");
    }

    /// Poll until `book_name` reaches `status` or the deadline passes.
    async fn wait_for_status(&self, book_name: &str, status: JobStatus) -> bool {
        for _ in 0..150 {
            if let Ok(Some(job)) = self.pipeline.jobs.get(book_name) {
                if job.status == status {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    async fn wait_for_running(&self, running: bool) {
        for _ in 0..100 {
            if self.orchestrator.status().running == running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("orchestrator running state never became {running}");
    }
}

#[tokio::test]
async fn test_events_are_handled_in_order() {
    let harness = TestHarness::new();
    let handle = harness.orchestrator.start();
    harness.wait_for_running(true).await;

    harness.download("Dune", 2).await;
    harness.download("Emma", 1).await;

    assert!(harness.wait_for_status("Dune", JobStatus::Completed).await);
    assert!(harness.wait_for_status("Emma", JobStatus::Completed).await);

    let completed: Vec<ConversionComplete> =
        harness.pipeline.bus.published_on(Channel::ConversionComplete);
    let order: Vec<&str> = completed.iter().map(|e| e.book_name.as_str()).collect();
    assert_eq!(order, vec!["Dune", "Emma"]);

    harness.orchestrator.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_malformed_payload_does_not_stop_loop() {
    let harness = TestHarness::new();
    let handle = harness.orchestrator.start();
    harness.wait_for_running(true).await;

    harness
        .pipeline
        .bus
        .publish(Channel::DownloadComplete, r#"{"book_name": 42}"#)
        .await
        .unwrap();
    harness
        .pipeline
        .bus
        .publish(Channel::RetryConversion, "")
        .await
        .unwrap();
    harness.download("Dune", 1).await;

    assert!(harness.wait_for_status("Dune", JobStatus::Completed).await);
    assert_eq!(harness.orchestrator.status().events_handled, 1);

    harness.orchestrator.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_handler_error_does_not_stop_loop() {
    let harness = TestHarness::new();
    let handle = harness.orchestrator.start();
    harness.wait_for_running(true).await;

    // No backup exists, so this handler returns an error.
    publish_event(
        harness.pipeline.bus.as_ref(),
        Channel::RetryConversion,
        &RetryConversion {
            book_name: "Ghost".to_string(),
            catalog_item_id: None,
            conversion_tracking_id: None,
            force: false,
        },
    )
    .await
    .unwrap();
    harness
        .pipeline
        .tool
        .set_next_error(ConverterError::tool_failed(Some(1), "boom"))
        .await;
    harness.download("Dune", 1).await;

    assert!(harness.wait_for_status("Ghost", JobStatus::Failed).await);
    assert!(harness.wait_for_status("Dune", JobStatus::Failed).await);

    let failed: Vec<ConversionFailed> = harness.pipeline.bus.published_on(Channel::ConversionFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].book_name, "Dune");

    harness.orchestrator.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_orchestrator_stop_is_graceful() {
    let harness = TestHarness::new();
    harness
        .pipeline
        .tool
        .set_run_duration(Duration::from_millis(200))
        .await;
    let handle = harness.orchestrator.start();
    harness.wait_for_running(true).await;

    harness.download("Dune", 1).await;
    assert!(harness.wait_for_status("Dune", JobStatus::Processing).await);

    // The in-flight conversion finishes before the loop exits.
    harness.orchestrator.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop")
        .unwrap();

    let job = harness.pipeline.jobs.get("Dune").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_orchestrator_status_reflects_running_state() {
    let harness = TestHarness::new();
    assert!(!harness.orchestrator.status().running);

    let handle = harness.orchestrator.start();
    harness.wait_for_running(true).await;
    assert_eq!(harness.orchestrator.status().processing_count, 0);

    harness.orchestrator.stop();
    handle.await.unwrap();
    assert!(!harness.orchestrator.status().running);
}
