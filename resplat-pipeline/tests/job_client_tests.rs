//! Job client integration tests against the in-process mock backend
//!
//! Poll accounting is the point here: terminal snapshots must stop
//! the loop immediately, and the attempt ceiling must be exact.

mod helpers;

use helpers::{completed_with, failed_with, queued, running, spawn_mock_backend};
use resplat_common::events::{EventBus, PipelineEvent};
use resplat_pipeline::services::{JobClient, JobStatus};
use resplat_pipeline::PipelineError;
use serde_json::json;
use std::time::Duration;

const FAST_POLL: Duration = Duration::from_millis(5);

#[tokio::test]
async fn test_submit_returns_job_id() {
    let backend = spawn_mock_backend().await;
    let client = JobClient::new(&backend.test_config().generation).unwrap();

    let submitted = client
        .submit(json!({"mode": "sharp_predict", "image_base64": "QUJD", "image_name": "in.png"}))
        .await
        .unwrap();

    assert_eq!(submitted.id, "job-123");
    assert_eq!(backend.submit_count(), 1);

    // The payload travels under the backend's `input` key
    let body = backend.last_submit_body().unwrap();
    assert_eq!(body["input"]["mode"], "sharp_predict");
    assert_eq!(body["input"]["image_name"], "in.png");
}

#[tokio::test]
async fn test_submit_surfaces_error_body_verbatim() {
    let backend = spawn_mock_backend().await;
    backend.fail_submit(400, "no such workflow");
    let client = JobClient::new(&backend.test_config().generation).unwrap();

    let err = client.submit(json!({})).await.unwrap_err();
    match err {
        PipelineError::Transport { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "no such workflow");
        }
        other => panic!("expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_poll_returns_on_first_completed_snapshot() {
    let backend = spawn_mock_backend().await;
    backend.script_statuses(vec![completed_with(json!({"files": []}))]);
    let client = JobClient::new(&backend.test_config().generation).unwrap();
    let events = EventBus::new(16);

    let result = client
        .poll_until_complete("job-123", &events, FAST_POLL, 10)
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Completed);
    // Exactly one status request; none after the terminal snapshot
    assert_eq!(backend.status_count(), 1);
}

#[tokio::test]
async fn test_poll_stops_after_failed_snapshot() {
    let backend = spawn_mock_backend().await;
    backend.script_statuses(vec![queued(), failed_with("OOM"), running()]);
    let client = JobClient::new(&backend.test_config().generation).unwrap();
    let events = EventBus::new(16);

    let err = client
        .poll_until_complete("job-123", &events, FAST_POLL, 10)
        .await
        .unwrap_err();

    match err {
        PipelineError::JobFailed(message) => assert_eq!(message, "OOM"),
        other => panic!("expected job failure, got {:?}", other),
    }
    // Two requests: the queued snapshot, then the terminal one
    assert_eq!(backend.status_count(), 2);
}

#[tokio::test]
async fn test_poll_times_out_after_exactly_max_attempts() {
    let backend = spawn_mock_backend().await;
    backend.script_statuses(vec![running()]);
    let client = JobClient::new(&backend.test_config().generation).unwrap();
    let events = EventBus::new(64);

    let err = client
        .poll_until_complete("job-123", &events, FAST_POLL, 7)
        .await
        .unwrap_err();

    match err {
        PipelineError::JobTimeout { attempts } => assert_eq!(attempts, 7),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(backend.status_count(), 7);
}

#[tokio::test]
async fn test_poll_emits_progress_with_raw_status_and_attempt() {
    let backend = spawn_mock_backend().await;
    backend.script_statuses(vec![
        queued(),
        running(),
        completed_with(json!({"files": []})),
    ]);
    let client = JobClient::new(&backend.test_config().generation).unwrap();
    let events = EventBus::new(64);
    let mut rx = events.subscribe();

    client
        .poll_until_complete("job-123", &events, FAST_POLL, 10)
        .await
        .unwrap();

    let mut progress = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PipelineEvent::JobProgress {
            status, attempt, ..
        } = event
        {
            progress.push((status, attempt));
        }
    }
    assert_eq!(
        progress,
        vec![
            ("IN_QUEUE".to_string(), 1),
            ("IN_PROGRESS".to_string(), 2),
            ("COMPLETED".to_string(), 3),
        ]
    );
}

#[tokio::test]
async fn test_failure_message_falls_back_to_output_error() {
    let backend = spawn_mock_backend().await;
    backend.script_statuses(vec![json!({
        "id": "job-123",
        "status": "FAILED",
        "output": {"error": "worker crashed"},
    })]);
    let client = JobClient::new(&backend.test_config().generation).unwrap();
    let events = EventBus::new(16);

    let err = client
        .poll_until_complete("job-123", &events, FAST_POLL, 10)
        .await
        .unwrap_err();
    match err {
        PipelineError::JobFailed(message) => assert_eq!(message, "worker crashed"),
        other => panic!("expected job failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_health_check() {
    let backend = spawn_mock_backend().await;
    let client = JobClient::new(&backend.test_config().generation).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.workers.idle, 1);
    assert_eq!(health.jobs.in_queue, 0);
}
