//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;

use rig::completion::{CompletionModel, CompletionRequestBuilder};
use rig::message::AssistantContent;

use crate::error::OracleError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role,
};

/// Adapter wrapping any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Clone,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, OracleError> {
        // System messages become the preamble; user messages are concatenated
        // into the prompt. Rate-limit text from the transport must survive
        // into the error reason so the retry wrapper can classify it.
        let mut preamble = String::new();
        let mut prompt = String::new();
        for ChatMessage { role, content } in request.messages {
            match role {
                Role::System => {
                    if !preamble.is_empty() {
                        preamble.push('\n');
                    }
                    preamble.push_str(&content);
                }
                Role::User => {
                    if !prompt.is_empty() {
                        prompt.push('\n');
                    }
                    prompt.push_str(&content);
                }
            }
        }

        let mut builder = CompletionRequestBuilder::new(self.model.clone(), prompt);
        if !preamble.is_empty() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens as u64);
        }

        let response = builder.send().await.map_err(|e| OracleError::RequestFailed {
            reason: e.to_string(),
        })?;

        let content = match response.choice.first() {
            AssistantContent::Text(text) => text.text,
            other => {
                return Err(OracleError::InvalidResponse {
                    reason: format!("expected text completion, got {:?}", other),
                });
            }
        };

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
        })
    }
}
