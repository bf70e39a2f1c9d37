//! Language-model boundary used by the pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::conversation::Turn;
use crate::error::Result;

/// Sampling parameters sent with each request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    /// Maximum tokens generated.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

impl From<&RagConfig> for GenerationOptions {
    fn from(config: &RagConfig) -> Self {
        Self { max_tokens: config.max_tokens, temperature: config.temperature, top_p: config.top_p }
    }
}

/// Text produced by a [`ChatModel`], with the reported token usage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// The generated answer.
    pub text: String,
    /// Total tokens consumed by the request, as reported by the model.
    pub tokens_used: u32,
}

/// A chat-completion model: ordered role-tagged turns in, one answer out.
///
/// Calls are single request/response exchanges with no streaming and no
/// retries; timeouts belong to the implementation's transport.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// The model name, reported back to callers as `model_used`.
    fn name(&self) -> &str;

    /// Generate an answer for `messages`.
    async fn complete(
        &self,
        messages: &[Turn],
        options: &GenerationOptions,
    ) -> Result<ChatCompletion>;
}
