//! Shared test helpers: in-process mock backends
//!
//! Spins up a real axum server on an ephemeral port that impersonates
//! both external services: the asynchronous job API (`/run`,
//! `/status/:id`, `/health`) and the synchronous enhancement endpoint
//! (`/enhance`). Status responses are scripted per test; request
//! counters make poll accounting assertable.
#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use resplat_common::config::PipelineConfig;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockState {
    /// Scripted `/status/:id` responses; the last entry repeats once
    /// the script is exhausted
    statuses: Mutex<VecDeque<Value>>,
    /// Override for `/run` (status code + body); default is a
    /// successful submission
    submit_override: Mutex<Option<(u16, String)>>,
    /// Response for `/enhance` (status code + JSON body)
    enhance_response: Mutex<Option<(u16, Value)>>,
    pub submit_count: AtomicU32,
    pub status_count: AtomicU32,
    pub enhance_count: AtomicU32,
    last_submit_body: Mutex<Option<Value>>,
    last_enhance_body: Mutex<Option<Value>>,
}

pub struct MockBackend {
    base_url: String,
    state: Arc<MockState>,
}

pub async fn spawn_mock_backend() -> MockBackend {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/run", post(handle_run))
        .route("/status/:id", get(handle_status))
        .route("/health", get(handle_health))
        .route("/enhance", post(handle_enhance))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend {
        base_url: format!("http://{}", addr),
        state,
    }
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    /// Pipeline configuration pointing every client at this mock,
    /// with fast polling and a short capture budget
    pub fn test_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.generation.api_key = Some("test-key".to_string());
        config.generation.base_url = Some(self.base_url());
        config.enhancement.api_key = Some("test-key".to_string());
        config.enhancement.endpoint = format!("{}/enhance", self.base_url());
        config.poll_interval_ms = 5;
        config.poll_max_attempts = 10;
        config.capture_timeout_ms = 150;
        config
    }

    /// Script the `/status/:id` response sequence
    pub fn script_statuses(&self, responses: Vec<Value>) {
        *self.state.statuses.lock().unwrap() = responses.into();
    }

    /// Make `/run` fail with the given status and body
    pub fn fail_submit(&self, status: u16, body: &str) {
        *self.state.submit_override.lock().unwrap() = Some((status, body.to_string()));
    }

    /// Set the `/enhance` response
    pub fn set_enhance_response(&self, status: u16, body: Value) {
        *self.state.enhance_response.lock().unwrap() = Some((status, body));
    }

    pub fn submit_count(&self) -> u32 {
        self.state.submit_count.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> u32 {
        self.state.status_count.load(Ordering::SeqCst)
    }

    pub fn enhance_count(&self) -> u32 {
        self.state.enhance_count.load(Ordering::SeqCst)
    }

    pub fn last_submit_body(&self) -> Option<Value> {
        self.state.last_submit_body.lock().unwrap().clone()
    }

    pub fn last_enhance_body(&self) -> Option<Value> {
        self.state.last_enhance_body.lock().unwrap().clone()
    }
}

/// Status snapshot helpers for scripting

pub fn queued() -> Value {
    json!({"id": "job-123", "status": "IN_QUEUE"})
}

pub fn running() -> Value {
    json!({"id": "job-123", "status": "IN_PROGRESS"})
}

pub fn completed_with(output: Value) -> Value {
    json!({"id": "job-123", "status": "COMPLETED", "output": output})
}

pub fn failed_with(error: &str) -> Value {
    json!({"id": "job-123", "status": "FAILED", "error": error})
}

async fn handle_run(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.submit_count.fetch_add(1, Ordering::SeqCst);
    *state.last_submit_body.lock().unwrap() = Some(body);

    if let Some((status, body)) = state.submit_override.lock().unwrap().clone() {
        return (StatusCode::from_u16(status).unwrap(), body).into_response();
    }
    Json(json!({"id": "job-123", "status": "IN_QUEUE"})).into_response()
}

async fn handle_status(
    State(state): State<Arc<MockState>>,
    Path(_id): Path<String>,
) -> Response {
    state.status_count.fetch_add(1, Ordering::SeqCst);

    let mut statuses = state.statuses.lock().unwrap();
    let snapshot = if statuses.len() > 1 {
        statuses.pop_front().unwrap()
    } else if let Some(last) = statuses.front() {
        last.clone()
    } else {
        running()
    };
    Json(snapshot).into_response()
}

async fn handle_health(State(_state): State<Arc<MockState>>) -> Response {
    Json(json!({
        "jobs": {"completed": 0, "failed": 0, "inProgress": 0, "inQueue": 0},
        "workers": {"idle": 1, "running": 0, "throttled": 0},
    }))
    .into_response()
}

async fn handle_enhance(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.enhance_count.fetch_add(1, Ordering::SeqCst);
    *state.last_enhance_body.lock().unwrap() = Some(body);

    match state.enhance_response.lock().unwrap().clone() {
        Some((status, body)) => {
            (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
        }
        None => Json(json!({"images": [{"url": "https://cdn.example/enhanced.png"}]}))
            .into_response(),
    }
}
