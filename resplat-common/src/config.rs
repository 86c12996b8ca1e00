//! Configuration loading for the resplat pipeline
//!
//! Resolution follows a fixed priority order:
//! 1. Explicit TOML config file (when a path is given)
//! 2. Environment variables (`RESPLAT_*`), overriding file values
//! 3. Compiled defaults
//!
//! API keys have no compiled default; a missing key surfaces as a
//! `Config` error when the owning client is constructed, not on the
//! first request.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default enhancement endpoint (fal qwen image-edit service)
pub const DEFAULT_ENHANCE_ENDPOINT: &str = "https://fal.run/fal-ai/qwen-image-edit-2509-lora";

/// Default polling interval between job status fetches (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Default polling attempt ceiling before a job is declared timed out
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 300;

/// Default wall-clock budget for one frame-capture cycle (milliseconds)
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 2000;

/// 3D-generation backend (asynchronous job API) settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Bearer token for the job API
    pub api_key: Option<String>,
    /// Serverless endpoint identifier (expanded into the base URL)
    pub endpoint_id: Option<String>,
    /// Full base URL override; takes precedence over `endpoint_id`
    pub base_url: Option<String>,
}

impl GenerationConfig {
    /// Resolve the effective base URL for the job API
    pub fn resolved_base_url(&self) -> Result<String> {
        if let Some(url) = &self.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match &self.endpoint_id {
            Some(id) if !id.is_empty() => Ok(format!("https://api.runpod.ai/v2/{}", id)),
            _ => Err(Error::Config(
                "generation endpoint not configured (set endpoint_id or base_url)".to_string(),
            )),
        }
    }
}

/// Enhancement backend (synchronous request/response) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// API key for the enhancement service
    pub api_key: Option<String>,
    /// Endpoint URL
    pub endpoint: String,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENHANCE_ENDPOINT.to_string(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub generation: GenerationConfig,
    pub enhancement: EnhancementConfig,
    /// Fixed interval between job status polls (milliseconds).
    /// Remote jobs run for minutes, so fixed-interval polling is
    /// intentional; predictable progress beats adaptive jitter here.
    pub poll_interval_ms: u64,
    /// Hard ceiling on status polls per job (client-side only)
    pub poll_max_attempts: u32,
    /// Wall-clock timeout for one frame-capture cycle (milliseconds)
    pub capture_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            enhancement: EnhancementConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
        }
    }
}

impl PipelineConfig {
    /// Load configuration: optional TOML file, then environment overrides
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("invalid config file: {}", e)))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides (`RESPLAT_*`)
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("RESPLAT_GENERATION_API_KEY") {
            self.generation.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("RESPLAT_GENERATION_ENDPOINT_ID") {
            self.generation.endpoint_id = Some(v);
        }
        if let Ok(v) = std::env::var("RESPLAT_GENERATION_BASE_URL") {
            self.generation.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("RESPLAT_ENHANCE_API_KEY") {
            self.enhancement.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("RESPLAT_ENHANCE_ENDPOINT") {
            self.enhancement.endpoint = v;
        }
        if let Ok(v) = std::env::var("RESPLAT_POLL_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.poll_interval_ms = ms;
            } else {
                tracing::warn!(value = %v, "ignoring non-numeric RESPLAT_POLL_INTERVAL_MS");
            }
        }
        if let Ok(v) = std::env::var("RESPLAT_POLL_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.poll_max_attempts = n;
            } else {
                tracing::warn!(value = %v, "ignoring non-numeric RESPLAT_POLL_MAX_ATTEMPTS");
            }
        }
        if let Ok(v) = std::env::var("RESPLAT_CAPTURE_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.capture_timeout_ms = ms;
            } else {
                tracing::warn!(value = %v, "ignoring non-numeric RESPLAT_CAPTURE_TIMEOUT_MS");
            }
        }
    }
}
