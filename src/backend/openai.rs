//! `OpenAI` generation backend using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! via the base URL override in [`EngineConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use async_trait::async_trait;

use crate::agent::config::EngineConfig;
use crate::backend::generation::{GenerationBackend, SamplingParams};
use crate::error::EngineError;

/// `OpenAI`-compatible generation backend.
///
/// Wraps the `async-openai` client for chat completions. Compatible
/// with any API that follows the `OpenAI` chat completion spec.
pub struct OpenAiGeneration {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGeneration {
    /// Creates a new backend from engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] when no API key is set.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::Configuration {
                message: "no API key configured (set QUERYLYTICS_API_KEY or OPENAI_API_KEY)"
                    .to_string(),
            })?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.generation_model.clone(),
        })
    }

    fn classify_error(error: OpenAIError) -> EngineError {
        match error {
            OpenAIError::Reqwest(inner) => EngineError::BackendUnavailable {
                backend: "generation",
                message: inner.to_string(),
            },
            other => EngineError::Generation {
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiGeneration {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(
        &self,
        context: &str,
        instructions: &str,
        params: &SamplingParams,
    ) -> Result<String, EngineError> {
        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(
                        instructions.to_string(),
                    ),
                    name: None,
                }),
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(context.to_string()),
                    name: None,
                }),
            ],
            temperature: Some(params.temperature),
            max_completion_tokens: Some(params.max_tokens),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(Self::classify_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(EngineError::Generation {
                message: "provider returned an empty completion".to_string(),
            });
        }

        Ok(content)
    }
}

impl std::fmt::Debug for OpenAiGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGeneration")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
