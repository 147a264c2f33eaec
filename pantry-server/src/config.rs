use anyhow::{Context, Result};

pub const DEFAULT_IMAGE_API_URL: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image";

/// Variables naming the image bucket, in order of preference.
/// `S3_BUCKET_NAME` is accepted for deployments configured before the move to GCS.
pub const BUCKET_VARS: [&str; 2] = ["IMAGE_BUCKET", "S3_BUCKET_NAME"];

/// The first of `names` that `lookup` finds.
fn first_var(names: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    names.iter().find_map(|name| lookup(name))
}

/// Decoding parameters for the text model. Sampling is deterministic.
#[derive(Clone, Debug)]
pub struct TextModelConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

impl Default for TextModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            max_tokens: 2000,
            temperature: 0.0,
            top_p: 1.0,
            stop: vec!["Human:".into()],
        }
    }
}

/// Diffusion parameters for the image model.
#[derive(Clone, Debug)]
pub struct ImageModelConfig {
    pub cfg_scale: u32,
    pub seed: u64,
    pub steps: u32,
    pub samples: u32,
    pub style_preset: String,
    /// Wraps the recipe text, `{prompt}` is replaced.
    pub wrapper: String,
}

impl Default for ImageModelConfig {
    fn default() -> Self {
        Self {
            cfg_scale: 10,
            seed: 0,
            steps: 35,
            samples: 1,
            style_preset: "photographic".into(),
            wrapper: "Close up picture of tasty {prompt}".into(),
        }
    }
}

impl ImageModelConfig {
    pub fn wrap(&self, prompt: &str) -> String {
        self.wrapper.replace("{prompt}", prompt)
    }
}

/// Everything the server reads from the environment (or a `.env` file).
#[derive(Clone, Debug)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub text_model: TextModelConfig,
    pub image_api_url: String,
    pub image_api_key: String,
    pub image_model: ImageModelConfig,
    /// Where generated images go. Not needed with the in-memory store.
    pub bucket: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut text_model = TextModelConfig::default();
        if let Ok(model) = dotenvy::var("TEXT_MODEL") {
            text_model.model = model;
        }
        Ok(Self {
            openai_api_key: dotenvy::var("OPENAI_API_KEY")
                .context("Could not find OPENAI_API_KEY in the environment.")?,
            openai_api_base: dotenvy::var("OPENAI_API_BASE").ok(),
            text_model,
            image_api_url: dotenvy::var("IMAGE_API_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_API_URL.into()),
            image_api_key: dotenvy::var("IMAGE_API_KEY")
                .context("Could not find IMAGE_API_KEY in the environment.")?,
            image_model: ImageModelConfig::default(),
            bucket: first_var(&BUCKET_VARS, |name| dotenvy::var(name).ok()),
        })
    }
}
