//! Language model collaborator.
//!
//! The controller only ever needs a single operation from the model:
//! `complete(prompt, max_tokens, stop_sequences) -> text`. [`LanguageModel`]
//! is that seam; [`http::HttpLanguageModel`] talks to a local
//! OpenAI-compatible completion server (llama.cpp, Ollama, vLLM).
//!
//! Raw completions are never used directly. Callers go through
//! [`complete_spoken`] or [`complete_label`], which apply the
//! [`sanitize`] passes for their use.

pub mod http;
pub mod sanitize;

use crate::config::LlmConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub stop: Vec<String>,
    pub temperature: f64,
}

impl CompletionRequest {
    /// Conversational reply budget.
    pub fn reply(prompt: impl Into<String>, config: &LlmConfig) -> Self {
        Self::with_budget(prompt, config.reply_max_tokens, config)
    }

    /// Short label/classification budget, sampled at zero temperature.
    pub fn classify(prompt: impl Into<String>, config: &LlmConfig) -> Self {
        let mut req = Self::with_budget(prompt, config.classify_max_tokens, config);
        req.temperature = 0.0;
        req
    }

    /// Structured summary budget.
    pub fn summary(prompt: impl Into<String>, config: &LlmConfig) -> Self {
        Self::with_budget(prompt, config.summary_max_tokens, config)
    }

    fn with_budget(prompt: impl Into<String>, max_tokens: u32, config: &LlmConfig) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            stop: config.stop_sequences.clone(),
            temperature: config.temperature,
        }
    }
}

/// Text completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `request.prompt`. The returned text may be empty.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Complete and clean the result for text-to-speech.
///
/// # Errors
///
/// Propagates the model's [`crate::error::CoachError::ModelInvocation`].
pub async fn complete_spoken(model: &dyn LanguageModel, request: &CompletionRequest) -> Result<String> {
    let raw = model.complete(request).await?;
    let clean = sanitize::for_speech(&raw);
    tracing::debug!(raw_len = raw.len(), clean_len = clean.len(), "model reply");
    Ok(clean)
}

/// Complete and reduce the result to a bare label (command name, YES/NO, index).
///
/// # Errors
///
/// Propagates the model's [`crate::error::CoachError::ModelInvocation`].
pub async fn complete_label(model: &dyn LanguageModel, request: &CompletionRequest) -> Result<String> {
    let raw = model.complete(request).await?;
    let label = sanitize::for_label(&raw);
    tracing::debug!(%label, "model label");
    Ok(label)
}
