//! Image enhancement client
//!
//! Single-shot request against the synchronous enhancement backend:
//! two input images (captured view first, original second) in, one
//! enhanced image URL out. No polling; the remote service blocks
//! until generation finishes.

use crate::error::{PipelineError, PipelineResult};
use resplat_common::config::EnhancementConfig;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

// The backend holds the request open for the whole generation.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Fixed editing prompt: repair the captured view's perspective and
/// fill blank regions using the original image as the scene reference
const ENHANCE_PROMPT: &str = "高斯泼溅,参考图2的场景图，修复图1的场景图透视并修复空白区域";

/// LoRA weights the enhancement model is steered with
const ENHANCE_LORAS: [&str; 2] = [
    "https://huggingface.co/dx8152/Qwen-Image-Edit-2511-Gaussian-Splash/resolve/main/%E9%AB%98%E6%96%AF%E6%B3%BC%E6%BA%85-Sharp.safetensors",
    "https://huggingface.co/lightx2v/Qwen-Image-Edit-2511-Lightning/resolve/main/Qwen-Image-Edit-2511-Lightning-4steps-V1.0-bf16.safetensors",
];

#[derive(Debug, Serialize)]
struct LoraConfig {
    path: &'static str,
}

#[derive(Debug, Serialize)]
struct EnhanceRequest<'a> {
    prompt: &'static str,
    num_inference_steps: u32,
    guidance_scale: f32,
    num_images: u32,
    enable_safety_checker: bool,
    output_format: &'static str,
    image_urls: [&'a str; 2],
    negative_prompt: &'static str,
    acceleration: &'static str,
    loras: Vec<LoraConfig>,
}

/// Enhancement API client
pub struct EnhanceClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl EnhanceClient {
    pub fn new(config: &EnhancementConfig) -> PipelineResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            resplat_common::Error::Config("enhancement api_key not configured".to_string())
        })?;
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }

    /// Produce an enhanced image from the captured view and the
    /// original upload; returns the result image URL
    pub async fn enhance(&self, captured_url: &str, original_url: &str) -> PipelineResult<String> {
        let request = EnhanceRequest {
            prompt: ENHANCE_PROMPT,
            num_inference_steps: 10,
            guidance_scale: 1.0,
            num_images: 1,
            enable_safety_checker: true,
            output_format: "png",
            image_urls: [captured_url, original_url],
            negative_prompt: " ",
            acceleration: "regular",
            loras: ENHANCE_LORAS
                .iter()
                .map(|path| LoraConfig { path })
                .collect(),
        };

        tracing::info!(endpoint = %self.endpoint, "submitting enhancement request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&request)
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

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;

        extract_image_url(&payload).ok_or_else(|| {
            PipelineError::MalformedResponse(format!(
                "response did not include images[0].url. Response: {}",
                payload
            ))
        })
    }
}

/// Pull `images[0].url` out of a success response
fn extract_image_url(payload: &Value) -> Option<String> {
    payload
        .get("images")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_image_url() {
        let payload = json!({"images": [{"url": "https://cdn.example/out.png"}]});
        assert_eq!(
            extract_image_url(&payload).as_deref(),
            Some("https://cdn.example/out.png")
        );
    }

    #[test]
    fn test_extract_image_url_missing_cases() {
        assert!(extract_image_url(&json!({})).is_none());
        assert!(extract_image_url(&json!({"images": []})).is_none());
        assert!(extract_image_url(&json!({"images": [{}]})).is_none());
        assert!(extract_image_url(&json!({"images": [{"url": 42}]})).is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let request = EnhanceRequest {
            prompt: ENHANCE_PROMPT,
            num_inference_steps: 10,
            guidance_scale: 1.0,
            num_images: 1,
            enable_safety_checker: true,
            output_format: "png",
            image_urls: ["data:image/png;base64,AA", "data:image/png;base64,BB"],
            negative_prompt: " ",
            acceleration: "regular",
            loras: ENHANCE_LORAS
                .iter()
                .map(|path| LoraConfig { path })
                .collect(),
        };
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["num_inference_steps"], 10);
        assert_eq!(body["image_urls"][0], "data:image/png;base64,AA");
        assert_eq!(body["image_urls"][1], "data:image/png;base64,BB");
        assert_eq!(body["loras"].as_array().unwrap().len(), 2);
        assert_eq!(body["output_format"], "png");
    }
}
