//! # resplat Common Library
//!
//! Shared code for the resplat pipeline:
//! - Pipeline stage and event types (PipelineEvent enum)
//! - EventBus for observer-style change notification
//! - Configuration loading (TOML file + environment overrides)
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
