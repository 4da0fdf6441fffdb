//! OpenAI-compatible `/v1/completions` adapter.
//!
//! Works against any local server exposing the legacy text completion
//! endpoint (llama.cpp `server`, Ollama, vLLM, LM Studio).

use super::{CompletionRequest, LanguageModel};
use crate::config::LlmConfig;
use crate::error::{CoachError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// HTTP completion client.
pub struct HttpLanguageModel {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpLanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLanguageModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpLanguageModel {
    /// Build a client from the `[llm]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`CoachError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CoachError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/completions", self.base_url)
    }
}

/// Extract an error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stop": request.stop,
            "stream": false,
        });

        let mut http = self.client.post(self.endpoint()).json(&body);
        if !self.api_key.is_empty() {
            http = http.bearer_auth(&self.api_key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| CoachError::ModelInvocation(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "completion endpoint returned an error");
            return Err(CoachError::ModelInvocation(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&text)
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CoachError::ModelInvocation(format!("unreadable completion body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| CoachError::ModelInvocation("completion had no choices".into()))?;
        Ok(text.trim().to_owned())
    }
}
