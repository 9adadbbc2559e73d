//! Language-model completion providers.
//!
//! Each backend implements [`CompletionProvider`]. [`CompletionClient`] wraps a
//! provider with the relay's fixed conversational prompt and sampling
//! parameters, so callers only hand it the user's text.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use voicebridge_core::config::CompletionSettings;
use voicebridge_core::error::{RelayError, Result};

#[cfg(feature = "openai")]
pub mod openai;

/// A single-prompt completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    /// Number of candidates to generate.
    pub n: u32,
    pub temperature: f64,
    pub stop: Option<Vec<String>>,
}

/// Candidates returned by a provider, in provider order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResult {
    pub choices: Vec<String>,
}

/// The core completion provider trait.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider identifier (e.g., "openai").
    fn id(&self) -> &str;

    /// Run one completion round.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult>;
}

/// Wrap user text in the conversational template.
pub fn build_prompt(text: &str) -> String {
    format!("User: {text}\nBot:")
}

/// Turns user text into a reply using a provider and fixed parameters.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: &CompletionSettings) -> Self {
        Self {
            provider,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    /// Build the request for a piece of user text.
    pub fn request_for(&self, text: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            prompt: build_prompt(text),
            max_tokens: self.max_tokens,
            n: 1,
            temperature: self.temperature,
            stop: None,
        }
    }

    /// Complete `text` and return the first candidate, whitespace-trimmed.
    pub async fn complete(&self, text: &str) -> Result<String> {
        let request = self.request_for(text);
        let result = self.provider.complete(&request).await?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                RelayError::Completion(format!("{} returned no choices", self.provider.id()))
            })?
            .trim()
            .to_string();

        debug!(provider = self.provider.id(), reply_len = reply.len(), "Completion finished");
        Ok(reply)
    }
}
