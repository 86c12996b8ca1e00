//! Asynchronous job API client
//!
//! Stateless request/response and polling primitive against the
//! remote 3D-generation backend. `submit` starts a job, `status`
//! fetches one snapshot, and `poll_until_complete` drives a job to a
//! terminal state at a fixed interval.
//!
//! Fixed-interval polling (no backoff) is intentional: these jobs run
//! for minutes, so poll overhead is negligible and a steady progress
//! cadence is what the observer wants.

use crate::error::{PipelineError, PipelineResult};
use chrono::Utc;
use resplat_common::config::GenerationConfig;
use resplat_common::events::{EventBus, PipelineEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = "resplat/0.1.0";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "IN_QUEUE")]
    Queued,
    #[serde(rename = "IN_PROGRESS")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl JobStatus {
    /// Raw wire string, as reported to progress observers
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "IN_QUEUE",
            JobStatus::Running => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

/// How an output slot carries its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Base64,
    S3Url,
}

/// One named output file or image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFile {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    /// Base64 payload or presigned URL, per `kind`
    pub data: String,
}

/// Output block of a completed (or failed) job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOutput {
    #[serde(default)]
    pub images: Option<Vec<JobFile>>,
    #[serde(default)]
    pub files: Option<Vec<JobFile>>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// One job status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPoll {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output: Option<JobOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response to a job submission
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub id: String,
    pub status: String,
}

/// Endpoint health snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub jobs: HealthJobs,
    pub workers: HealthWorkers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthJobs {
    #[serde(rename = "completed")]
    pub completed: u64,
    #[serde(rename = "failed")]
    pub failed: u64,
    #[serde(rename = "inProgress")]
    pub in_progress: u64,
    #[serde(rename = "inQueue")]
    pub in_queue: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthWorkers {
    pub idle: u64,
    pub running: u64,
    #[serde(default)]
    pub throttled: u64,
}

/// Job API client
pub struct JobClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl JobClient {
    pub fn new(config: &GenerationConfig) -> PipelineResult<Self> {
        let base_url = config.resolved_base_url()?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            resplat_common::Error::Config("generation api_key not configured".to_string())
        })?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Submit an asynchronous job; `input` is the opaque mode/payload
    /// descriptor the backend expects under its `input` key
    pub async fn submit(&self, input: Value) -> PipelineResult<SubmitResponse> {
        let response = self
            .http
            .post(format!("{}/run", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;
        tracing::info!(job_id = %submitted.id, status = %submitted.status, "job submitted");
        Ok(submitted)
    }

    /// Fetch one status snapshot for a job
    pub async fn status(&self, job_id: &str) -> PipelineResult<JobPoll> {
        let response = self
            .http
            .get(format!("{}/status/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))
    }

    /// Check endpoint health (queue depth and worker counts)
    pub async fn health(&self) -> PipelineResult<HealthResponse> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))
    }

    /// Poll a job until it reaches a terminal state
    ///
    /// Emits a `JobProgress` event per poll (raw status string,
    /// 1-based attempt) as an observable side effect. Returns the
    /// final snapshot on `COMPLETED`, `JobFailed` on `FAILED`, and
    /// `JobTimeout` after `max_attempts` non-terminal snapshots. No
    /// status request is ever issued after a terminal state has been
    /// observed, and polls are strictly sequential.
    pub async fn poll_until_complete(
        &self,
        job_id: &str,
        events: &EventBus,
        interval: Duration,
        max_attempts: u32,
    ) -> PipelineResult<JobPoll> {
        for attempt in 1..=max_attempts {
            let snapshot = self.status(job_id).await?;
            events.emit_lossy(PipelineEvent::JobProgress {
                job_id: job_id.to_string(),
                status: snapshot.status.as_str().to_string(),
                attempt,
                timestamp: Utc::now(),
            });
            tracing::debug!(
                job_id,
                status = snapshot.status.as_str(),
                attempt,
                "poll attempt"
            );

            match snapshot.status {
                JobStatus::Completed => return Ok(snapshot),
                JobStatus::Failed => {
                    return Err(PipelineError::JobFailed(failure_message(&snapshot)))
                }
                JobStatus::Queued | JobStatus::Running => {
                    tokio::time::sleep(interval).await;
                }
            }
        }

        Err(PipelineError::JobTimeout {
            attempts: max_attempts,
        })
    }
}

/// Failure message resolution: the job's own error field, falling back
/// to the output-level error field, falling back to a generic message
fn failure_message(snapshot: &JobPoll) -> String {
    snapshot
        .error
        .clone()
        .or_else(|| snapshot.output.as_ref().and_then(|o| o.error.clone()))
        .unwrap_or_else(|| "Job failed".to_string())
}
