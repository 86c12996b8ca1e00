//! Enhancement stage: single-shot request producing the final image
//! from the captured view and the original upload

use super::PipelineOrchestrator;
use crate::error::{PipelineError, PipelineResult};
use resplat_common::events::PipelineStage;

impl PipelineOrchestrator {
    /// Enhance the captured view and install the terminal result
    ///
    /// Runs with the stage at `Capturing` (the captured view already
    /// stored); advances through `Enhancing` to `Result`. The caller
    /// handles demotion on error.
    pub(crate) async fn run_enhancement(&self) -> PipelineResult<()> {
        let captured = self
            .store
            .captured_view()
            .ok_or_else(|| PipelineError::UserInput("no captured view to enhance".into()))?;
        let source = self
            .store
            .source_image()
            .ok_or_else(|| PipelineError::UserInput("no source image for reference".into()))?;

        self.store.set_stage(PipelineStage::Enhancing);
        self.store.set_job_progress("Submitting enhancement job");

        let enhanced_url = self.enhance_client.enhance(&captured, &source.data).await?;

        self.store.set_enhanced_result(Some(enhanced_url));
        self.store.set_stage(PipelineStage::Result);
        self.store.set_job_progress("");

        tracing::info!("enhanced result installed");
        Ok(())
    }
}
