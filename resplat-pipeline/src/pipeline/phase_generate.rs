//! Generation stage: submit the 3D-generation job and install its
//! output as the generated asset

use super::{strip_data_uri_prefix, PipelineOrchestrator};
use crate::error::{PipelineError, PipelineResult};
use crate::services::JobPoll;
use chrono::Utc;
use resplat_common::events::{PipelineEvent, PipelineStage};
use serde_json::json;

/// File extension of the 3D-data output slot
const ASSET_EXTENSION: &str = ".ply";

impl PipelineOrchestrator {
    /// Submit the generation job for the stored source image, poll it
    /// to completion, and install the resulting asset
    ///
    /// Runs with the stage at `Uploading`; advances through
    /// `GeneratingAsset` to `Viewing3D`. The caller handles demotion
    /// on error.
    pub(crate) async fn run_generation(&self) -> PipelineResult<()> {
        let source = self
            .store
            .source_image()
            .ok_or_else(|| PipelineError::UserInput("no source image to generate from".into()))?;

        self.store.set_stage(PipelineStage::GeneratingAsset);
        self.store.set_job_progress("Submitting generation job...");

        let submitted = self
            .job_client
            .submit(json!({
                "mode": "sharp_predict",
                "image_base64": strip_data_uri_prefix(&source.data),
                "image_name": source.name,
            }))
            .await?;

        self.store.set_job_id(Some(submitted.id.clone()));
        self.events.emit_lossy(PipelineEvent::JobSubmitted {
            job_id: submitted.id.clone(),
            timestamp: Utc::now(),
        });
        self.store
            .set_job_progress(format!("Job {} submitted. Waiting...", submitted.id));

        let completed = self
            .job_client
            .poll_until_complete(
                &submitted.id,
                &self.events,
                self.poll_interval,
                self.poll_max_attempts,
            )
            .await?;

        let payload = extract_asset_payload(&completed)?;
        self.store.set_generated_asset(Some(payload))?;
        self.store.set_stage(PipelineStage::Viewing3D);
        self.store.set_job_progress("");

        tracing::info!(job_id = %submitted.id, "generated asset installed");
        Ok(())
    }
}

/// Find the 3D-data payload in a completed job's outputs
///
/// Looks for a `.ply`-named entry in the files list first, then in
/// the images list. The second lookup is a compatibility shim: some
/// backend handlers route every output through the images slot
/// regardless of content type, so the same payload can show up under
/// either label.
fn extract_asset_payload(completed: &JobPoll) -> PipelineResult<String> {
    let output = completed.output.as_ref();
    let files = output.and_then(|o| o.files.as_deref()).unwrap_or(&[]);
    let images = output.and_then(|o| o.images.as_deref()).unwrap_or(&[]);

    if let Some(file) = files.iter().find(|f| f.filename.ends_with(ASSET_EXTENSION)) {
        return Ok(file.data.clone());
    }
    if let Some(file) = images.iter().find(|f| f.filename.ends_with(ASSET_EXTENSION)) {
        return Ok(file.data.clone());
    }

    if files.is_empty() && images.is_empty() {
        let errors = output
            .and_then(|o| o.errors.clone())
            .unwrap_or_default();
        let detail = if errors.is_empty() {
            "Unknown error".to_string()
        } else {
            errors.join("; ")
        };
        return Err(PipelineError::MalformedResponse(format!(
            "Job completed but produced no outputs. {}",
            detail
        )));
    }

    Err(PipelineError::MalformedResponse(format!(
        "Job completed but no {} file was found in the output. Got {} image(s) and {} file(s).",
        ASSET_EXTENSION,
        images.len(),
        files.len()
    )))
}
