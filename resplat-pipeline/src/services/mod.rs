//! External backend clients
//!
//! - `job_client`: asynchronous 3D-generation job API (submit + poll)
//! - `enhance_client`: synchronous image-enhancement API (single shot)

pub mod enhance_client;
pub mod job_client;

pub use enhance_client::EnhanceClient;
pub use job_client::{JobClient, JobFile, JobOutput, JobPoll, JobStatus, PayloadKind};
