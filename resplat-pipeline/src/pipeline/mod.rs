//! Pipeline orchestrator
//!
//! The authoritative state machine for one pipeline session and the
//! only component permitted to advance `PipelineStage`.
//!
//! # Stage progression
//! Idle → Uploading → GeneratingAsset → Viewing3D → Capturing →
//! Enhancing → Result
//!
//! Each stage body lives in a dedicated `phase_*` module:
//! - **GeneratingAsset** (`phase_generate`): submit the 3D-generation
//!   job, poll it, install the asset
//! - **Enhancing** (`phase_enhance`): single-shot enhancement of the
//!   captured view
//!
//! Failure demotes generation to `Idle` and capture/enhancement to
//! `Viewing3D`, always with one human-readable message published to
//! the store. The UI-observable stage doubles as the mutual-exclusion
//! token: entry points verify the current stage before acting, so two
//! stage-advancing operations can never overlap.

mod phase_enhance;
mod phase_generate;

use crate::capture::{FrameCaptureBridge, RenderSurface};
use crate::error::{PipelineError, PipelineResult};
use crate::services::{EnhanceClient, JobClient};
use crate::store::AssetStore;
use resplat_common::config::PipelineConfig;
use resplat_common::events::{EventBus, PipelineStage};
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator for one pipeline session
///
/// Owns the session context (asset store), both backend clients, and
/// the frame-capture bridge. There is no global state; observers reach
/// everything through `store()` and the event bus.
pub struct PipelineOrchestrator {
    store: Arc<AssetStore>,
    events: EventBus,
    job_client: JobClient,
    enhance_client: EnhanceClient,
    capture_bridge: FrameCaptureBridge,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl PipelineOrchestrator {
    pub fn new(config: &PipelineConfig, events: EventBus) -> PipelineResult<Self> {
        let job_client = JobClient::new(&config.generation)?;
        let enhance_client = EnhanceClient::new(&config.enhancement)?;
        let store = Arc::new(AssetStore::new(events.clone()));
        let capture_bridge =
            FrameCaptureBridge::new(Duration::from_millis(config.capture_timeout_ms));
        Ok(Self {
            store,
            events,
            job_client,
            enhance_client,
            capture_bridge,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_max_attempts: config.poll_max_attempts,
        })
    }

    /// Session context: artifacts, stage, error field
    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    /// Capture bridge, for wiring the renderer's frame signal
    pub fn capture_bridge(&self) -> &FrameCaptureBridge {
        &self.capture_bridge
    }

    /// Job client, for out-of-band use (health checks)
    pub fn job_client(&self) -> &JobClient {
        &self.job_client
    }

    /// User confirmed an upload: store the source image and run the
    /// generation stage to completion
    ///
    /// `payload` is the encoded image (data-URI form), `name` its
    /// display name. Fails with `UserInput` without touching the stage
    /// when the payload is unusable or a run is already in progress;
    /// any generation failure demotes the stage back to `Idle` with
    /// the error published.
    pub async fn confirm_upload(
        &self,
        payload: String,
        name: String,
        aspect_ratio: Option<f64>,
    ) -> PipelineResult<()> {
        if payload.is_empty() {
            return self.reject_input("uploaded image is empty");
        }
        if name.is_empty() {
            return self.reject_input("uploaded image has no name");
        }
        let stage = self.store.stage();
        if stage != PipelineStage::Idle {
            return self.reject_input(format!("cannot start an upload while {}", stage));
        }

        self.store.clear_error();
        self.store.set_source_image(payload, name, aspect_ratio);
        self.store.set_stage(PipelineStage::Uploading);

        match self.run_generation().await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(error = %err, "generation stage failed");
                self.store.set_stage(PipelineStage::Idle);
                self.store.set_error(err.to_string());
                self.store.set_job_progress("");
                Err(err)
            }
        }
    }

    /// User requested a capture of the current 3D view
    ///
    /// Arms the frame-capture bridge and, on success, runs the
    /// enhancement stage to completion. Capture and enhancement
    /// failures both demote back to `Viewing3D` so the user can retry
    /// without re-running generation. A silently cancelled arm cycle
    /// (bridge torn down underneath us) also returns to `Viewing3D`,
    /// with no error published.
    pub async fn request_capture<S: RenderSurface + ?Sized>(
        &self,
        surface: &S,
    ) -> PipelineResult<()> {
        let stage = self.store.stage();
        if stage != PipelineStage::Viewing3D {
            return self.reject_input(format!("cannot capture while {}", stage));
        }

        self.store.clear_error();
        self.store.set_stage(PipelineStage::Capturing);

        match self.capture_bridge.capture(surface).await {
            None => {
                self.store.set_stage(PipelineStage::Viewing3D);
                return Ok(());
            }
            Some(Err(capture_err)) => {
                let err = PipelineError::CaptureFailed(capture_err.to_string());
                tracing::warn!(error = %err, "capture failed");
                self.store.set_stage(PipelineStage::Viewing3D);
                self.store.set_error(err.to_string());
                return Err(err);
            }
            Some(Ok(image)) => {
                self.store.set_captured_view(Some(image));
            }
        }

        match self.run_enhancement().await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(error = %err, "enhancement stage failed");
                self.store.set_stage(PipelineStage::Viewing3D);
                self.store.set_error(err.to_string());
                self.store.set_job_progress("");
                Err(err)
            }
        }
    }

    /// User restarted: release every handle and return to first-load
    /// state
    pub fn reset(&self) {
        self.capture_bridge.cancel();
        self.store.reset();
    }

    fn reject_input(&self, message: impl Into<String>) -> PipelineResult<()> {
        let err = PipelineError::UserInput(message.into());
        self.store.set_error(err.to_string());
        Err(err)
    }
}

/// Extract the base64 body from a data URI
///
/// `data:image/png;base64,ABC` → `ABC`; input without a comma is
/// passed through unchanged.
pub(crate) fn strip_data_uri_prefix(data: &str) -> &str {
    match data.split_once(',') {
        Some((_, body)) => body,
        None => data,
    }
}
