//! Oracle adapter — the seam between the pipeline and the LLM.
//!
//! Stages never see an HTTP client or a model name; they see `Oracle`, which
//! takes a prompt and returns the raw completion text. `decode` turns that
//! text into an expected shape, tolerating markdown fencing. The pipeline
//! never depends on which underlying model answers, only on this contract.

pub mod batch;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::OracleError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Max tokens for a classification call (kept tight; runs per stage or per
/// conversation).
const CLASSIFY_MAX_TOKENS: u32 = 2048;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// The text-classification oracle.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one prompt, return the raw completion text.
    ///
    /// Failures carry the upstream message in their display text so the
    /// retry wrapper can spot rate-limit signatures.
    async fn classify(&self, system: &str, prompt: &str) -> Result<String, OracleError>;
}

/// Oracle backed by an `LlmProvider`.
pub struct LlmOracle {
    llm: Arc<dyn LlmProvider>,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn classify(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(prompt),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }
}

/// Decode an expected shape out of raw oracle text.
///
/// The oracle may wrap its JSON in markdown or surrounding prose; extraction
/// handles both before parsing.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    let json = extract_json(raw);
    serde_json::from_str(&json).map_err(|e| OracleError::InvalidResponse {
        reason: format!("shape mismatch: {e}"),
    })
}

/// Extract a JSON value (object or array) from LLM output.
fn extract_json(text: &str) -> String {
    let trimmed = text.trim();

    // Already bare JSON
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.to_string();
    }

    // Wrapped in a markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') || inner.starts_with('[') {
                return inner.to_string();
            }
        }
    }

    // Embedded in surrounding prose: prefer an array over an object when the
    // array starts first, since stage responses are usually lists.
    let obj = bounds(trimmed, '{', '}');
    let arr = bounds(trimmed, '[', ']');
    match (obj, arr) {
        (Some((os, oe)), Some((as_, ae))) => {
            if as_ < os {
                trimmed[as_..=ae].to_string()
            } else {
                trimmed[os..=oe].to_string()
            }
        }
        (Some((s, e)), None) | (None, Some((s, e))) => trimmed[s..=e].to_string(),
        (None, None) => trimmed.to_string(),
    }
}

fn bounds(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then_some((start, end))
}
