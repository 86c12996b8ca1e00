//! Error types for the resplat pipeline
//!
//! One taxonomy covers both backends and the capture bridge. Every
//! stage-advancing operation in the orchestrator converts a failure
//! into exactly one of these, demotes the stage to its fallback, and
//! publishes the human-readable message to the store's error field.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Non-success HTTP status from either backend; the response body
    /// is carried verbatim for diagnosability
    #[error("API error ({status}): {body}")]
    Transport { status: u16, body: String },

    /// The remote job itself reported failure
    #[error("{0}")]
    JobFailed(String),

    /// Polling exhausted its attempt ceiling without a terminal status
    #[error("Job timed out after {attempts} attempts")]
    JobTimeout { attempts: u32 },

    /// Frame capture failed (unreadable/empty surface, or timeout
    /// waiting for a rendered frame)
    #[error("Failed to capture view: {0}")]
    CaptureFailed(String),

    /// Success response missing an expected field
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid user input (e.g. a non-image upload)
    #[error("Invalid input: {0}")]
    UserInput(String),

    /// Asset store rejected a payload
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transport-level failure before any HTTP status was produced
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration problem detected at client construction
    #[error(transparent)]
    Config(#[from] resplat_common::Error),
}
