//! OpenAI Completions API provider.
//!
//! Implements single-prompt completions via `/v1/completions`. Any
//! OpenAI-compatible server exposing that route works through `base_url`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use voicebridge_core::config::CompletionSettings;
use voicebridge_core::error::{RelayError, Result};

use crate::{CompletionProvider, CompletionRequest, CompletionResult};

pub struct OpenAiProvider {
    pub base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(settings: &CompletionSettings, client: reqwest::Client) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client,
        }
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    n: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn id(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        let url = format!("{}/v1/completions", self.base_url);
        let body = OpenAiRequest {
            model: &request.model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            n: request.n,
            temperature: request.temperature,
            stop: request.stop.as_deref(),
        };

        debug!(model = %request.model, prompt_len = request.prompt.len(), "Sending completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Completion(format!("OpenAI request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body, "OpenAI completion failed");
            return Err(RelayError::Completion(format!("OpenAI API error {status}: {body}")));
        }

        let parsed: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Completion(format!("OpenAI response decode failed: {e}")))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        let mut choices = parsed.choices;
        choices.sort_by_key(|c| c.index);

        Ok(CompletionResult {
            choices: choices.into_iter().map(|c| c.text).collect(),
        })
    }
}
