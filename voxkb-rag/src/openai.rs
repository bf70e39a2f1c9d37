//! OpenAI-compatible HTTP providers for embeddings and chat completions.
//!
//! Both clients talk to `/v1/embeddings` and `/v1/chat/completions` on a
//! configurable base URL, so they work against the hosted OpenAI API as well
//! as local OpenAI-compatible servers serving the embedding model.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::conversation::Turn;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{ChatCompletion, ChatModel, GenerationOptions};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// The native dimensionality of `text-embedding-3-large`.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 3072;

const PROVIDER: &str = "OpenAI";

fn read_api_key() -> Result<String> {
    let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
        RagError::ConfigError("OPENAI_API_KEY environment variable not set".to_string())
    })?;
    if key.trim().is_empty() {
        return Err(RagError::ConfigError("OPENAI_API_KEY is empty".to_string()));
    }
    Ok(key)
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings endpoint.
///
/// # Configuration
///
/// - `base_url` – defaults to [`OPENAI_BASE_URL`]; point it at a local server to
///   embed with a self-hosted model.
/// - `model` – defaults to `text-embedding-3-large`.
/// - `dimensions` – the model's native output size; the embedding service
///   truncates to the configured dimensionality afterwards.
///
/// # Example
///
/// ```rust,ignore
/// use voxkb_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?
///     .with_base_url("http://127.0.0.1:1234/v1")
///     .with_model("stella_en_1.5B_v5")
///     .with_dimensions(8192);
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("embedding API key must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        })
    }

    /// Create a new provider using `OPENAI_API_KEY`, honouring `VOXKB_EMBEDDING_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is missing.
    pub fn from_env() -> Result<Self> {
        let provider = Self::new(read_api_key()?)?;
        Ok(match std::env::var("VOXKB_EMBEDDING_URL") {
            Ok(url) if !url.trim().is_empty() => provider.with_base_url(url),
            _ => provider,
        })
    }

    /// Set the API base URL (for example `http://127.0.0.1:1234/v1`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the model's native output dimensionality.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest { model: &self.model, input: texts.to_vec() };

        let response = self
            .client
            .post(join_url(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::embedding(PROVIDER, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = PROVIDER, %detail, "embedding API error");
            return Err(RagError::embedding(PROVIDER, detail));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// A [`ChatModel`] backed by an OpenAI-compatible chat-completions endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use voxkb_rag::openai::OpenAIChatModel;
///
/// let model = OpenAIChatModel::from_env("gpt-4o-mini")?;
/// ```
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIChatModel {
    /// Create a client for `model` using the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is empty.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("chat API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: model.into(),
        })
    }

    /// Create a client using `OPENAI_API_KEY`, honouring `OPENAI_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is missing.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let client = Self::new(read_api_key()?, model)?;
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => client.with_base_url(url),
            _ => client,
        })
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

fn into_completion(response: ChatResponse) -> Result<ChatCompletion> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| RagError::model(PROVIDER, "response contained no message content"))?;
    let tokens_used = response.usage.map(|u| u.total_tokens).unwrap_or(0);
    Ok(ChatCompletion { text: text.trim().to_string(), tokens_used })
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Turn],
        options: &GenerationOptions,
    ) -> Result<ChatCompletion> {
        debug!(provider = PROVIDER, model = %self.model, turns = messages.len(), "chat completion");

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let response = self
            .client
            .post(join_url(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::model(PROVIDER, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RagError::model(PROVIDER, error_detail(response).await));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::model(PROVIDER, format!("failed to parse response: {e}")))?;
        into_completion(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_join_ignores_trailing_slash() {
        assert_eq!(
            join_url("http://localhost:1234/v1/", "embeddings"),
            "http://localhost:1234/v1/embeddings"
        );
        assert_eq!(
            join_url(OPENAI_BASE_URL, "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_request_serializes_turns_with_roles() {
        let messages = [Turn::system("be brief"), Turn::user("hi")];
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: 800,
            temperature: 0.7,
            top_p: 0.9,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 800);
    }

    #[test]
    fn completion_is_trimmed_and_reports_usage() {
        let payload: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Hello there. \n"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":3,"total_tokens":13}}"#,
        )
        .unwrap();
        let completion = into_completion(payload).unwrap();
        assert_eq!(completion.text, "Hello there.");
        assert_eq!(completion.tokens_used, 13);
    }

    #[test]
    fn completion_without_choices_is_model_error() {
        let payload: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(into_completion(payload), Err(RagError::ModelError { .. })));
    }

    #[test]
    fn empty_keys_are_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::ConfigError(_))));
        assert!(matches!(OpenAIChatModel::new(" ", "gpt-4o-mini"), Err(RagError::ConfigError(_))));
    }
}
