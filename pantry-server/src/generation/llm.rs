use anyhow::anyhow;
use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, Stop,
    },
};
use async_trait::async_trait;

use super::TextModel;
use crate::config::TextModelConfig;

/// Chat-completion client for any OpenAI compatible endpoint.
#[derive(Clone)]
pub struct OpenAITextModel {
    client: async_openai::Client<OpenAIConfig>,
    config: TextModelConfig,
}

impl OpenAITextModel {
    pub fn new(api_key: &str, api_base: Option<&str>, config: TextModelConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(api_base) = api_base {
            openai_config = openai_config.with_api_base(api_base);
        }
        Self {
            client: async_openai::Client::with_config(openai_config),
            config,
        }
    }
}

#[async_trait]
impl TextModel for OpenAITextModel {
    /// Calls the LLM one-shot API with a given prompt.
    ///
    /// Exactly one request is made. Transport, auth and quota failures are
    /// returned as they are, without retrying.
    async fn generate(&self, prompt: &str, system: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        ];
        let req_args = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .top_p(self.config.top_p)
            .stop(Stop::StringArray(self.config.stop.clone()))
            .messages(messages)
            .build()?;
        tracing::info!("Calling text model {}", self.config.model);
        let text = self
            .client
            .chat()
            .create(req_args)
            .await?
            .choices
            .first()
            .ok_or(anyhow!("No response from LLM"))?
            .clone()
            .message
            .content
            .ok_or(anyhow!("No response from LLM"))?;
        Ok(text)
    }
}
