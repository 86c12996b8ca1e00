//! resplat-pipeline library interface
//!
//! Orchestration core for the image → 3D splat → enhanced-view
//! pipeline: the asset store, the two backend clients, the
//! frame-capture bridge, and the stage state machine that ties them
//! together. The presentation layer and the CLI binary drive the
//! pipeline exclusively through `PipelineOrchestrator`.

pub mod capture;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod store;

pub use crate::error::{PipelineError, PipelineResult};
pub use crate::pipeline::PipelineOrchestrator;
