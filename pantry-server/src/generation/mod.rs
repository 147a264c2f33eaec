use anyhow::Result;
use async_trait::async_trait;

pub mod fanout;
pub mod illustrate;
pub mod llm;

pub use fanout::{default_concurrency, fan_out, generate_all};
pub use illustrate::StabilityImageModel;
pub use llm::OpenAITextModel;

/// A text-generation backend, called once per pipeline run.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Returns the model's raw reply to `prompt`, under the `system` directive.
    async fn generate(&self, prompt: &str, system: &str) -> Result<String>;
}

/// An image-generation backend.
///
/// Implementations must hold no per-call mutable state, since the fan-out
/// calls them concurrently.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Returns the decoded bytes of one image depicting `prompt`.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}
