/// Language-model fallback consulted when the dataset has no confident match.
use async_trait::async_trait;
use tracing::{info, warn};

use support_common::error::CommonError;
use support_common::openai::{
    ChatCompletionRequest, ChatCompletionResponse, Message, OpenAiClient,
};

use crate::config::FallbackConfig;

/// Text in, text out. Implementations must surface failures as [`CommonError`] and never
/// retry more than once.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, query: &str) -> Result<String, CommonError>;
}

/// Responder backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiResponder {
    client: OpenAiClient,
    config: FallbackConfig,
}

impl OpenAiResponder {
    pub fn new(client: OpenAiClient, config: FallbackConfig) -> Self {
        Self { client, config }
    }

    fn build_request(&self, query: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message::system(self.config.system_prompt.clone()),
                Message::user(query),
            ],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        }
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn respond(&self, query: &str) -> Result<String, CommonError> {
        let request = self.build_request(query);
        let attempt_timeout = self.client.config().default_timeout;
        info!(model = %self.config.model, "querying fallback model");

        let response = self
            .client
            .chat_completions(request, None)
            .await
            .map_err(|e| {
                warn!(error = %e, "fallback request failed");
                e.into_common(attempt_timeout)
            })?;

        completion_text(&response)
    }
}

/// A reply with no usable text counts as the service being unavailable.
fn completion_text(response: &ChatCompletionResponse) -> Result<String, CommonError> {
    response.first_text().ok_or_else(|| {
        CommonError::ServiceUnavailable(
            "missing choices[0].message.content in fallback response".to_string(),
        )
    })
}
