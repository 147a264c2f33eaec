use anyhow::anyhow;
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::json;

use super::ImageModel;
use crate::config::ImageModelConfig;

/// Text-to-image client for a Stability style generation endpoint.
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Clone)]
pub struct StabilityImageModel {
    client: Client,
    url: String,
    api_key: String,
    config: ImageModelConfig,
}

impl StabilityImageModel {
    pub fn new(url: &str, api_key: &str, config: ImageModelConfig) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            config,
        }
    }

    /// The request body for one image, with every diffusion parameter pinned.
    pub fn request_body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "text_prompts": [
                { "text": self.config.wrap(prompt) }
            ],
            "cfg_scale": self.config.cfg_scale,
            "seed": self.config.seed,
            "steps": self.config.steps,
            "samples": self.config.samples,
            "style_preset": self.config.style_preset,
        })
    }
}

/// Pull the first artifact out of a generation response and decode it.
fn decode_first_artifact(response: &serde_json::Value) -> Result<Vec<u8>> {
    let encoded = response
        .pointer("/artifacts/0/base64")
        .ok_or_else(|| anyhow!("No image artifact in response"))?
        .as_str()
        .ok_or_else(|| anyhow!("Image artifact is not a string"))?;
    Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
}

#[async_trait]
impl ImageModel for StabilityImageModel {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        tracing::info!("Generating image for {}", prompt);
        let image_generation_response: serde_json::Value = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&self.request_body(prompt))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode_first_artifact(&image_generation_response)
    }
}
