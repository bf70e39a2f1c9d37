//! Configuration for the knowledge base and response generation.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Instruction template prepended to every search query before it is embedded.
pub const DEFAULT_QUERY_INSTRUCTION: &str =
    "Instruct: Given a web search query, retrieve relevant passages that answer the query.\nQuery: ";

/// Configuration parameters shared by the knowledge base and the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Name of the collection holding the knowledge base.
    pub collection_name: String,
    /// Identifier of the embedding model, reported by `stats`.
    pub embedding_model: String,
    /// Number of leading embedding components kept (Matryoshka truncation).
    pub embedding_dimension: usize,
    /// Number of results retrieved when the caller does not override it.
    pub top_k: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: f32,
    /// Upper bound on the assembled context text in characters. `0` disables it.
    pub max_context_chars: usize,
    /// Chat model used for generation.
    pub chat_model: String,
    /// Maximum tokens generated per answer.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling probability mass.
    pub top_p: f32,
    /// Conversation used when the caller does not name one.
    pub default_conversation_id: String,
    /// Location of the durable SQLite knowledge base.
    pub persist_path: PathBuf,
    /// Template wrapped around queries before embedding.
    pub query_instruction: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection_name: "local_knowledge".to_string(),
            embedding_model: "NovaSearch/stella_en_1.5B_v5".to_string(),
            embedding_dimension: 1024,
            top_k: 5,
            similarity_threshold: 0.3,
            max_context_chars: 4000,
            chat_model: "gpt-4o-mini".to_string(),
            max_tokens: 800,
            temperature: 0.7,
            top_p: 0.9,
            default_conversation_id: "default".to_string(),
            persist_path: PathBuf::from("./knowledge_db/knowledge.db"),
            query_instruction: DEFAULT_QUERY_INSTRUCTION.to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from the defaults overridden by `VOXKB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable cannot be parsed or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(name) = lookup("VOXKB_COLLECTION") {
            builder = builder.collection_name(name);
        }
        if let Some(model) = lookup("VOXKB_EMBEDDING_MODEL") {
            builder = builder.embedding_model(model);
        }
        if let Some(raw) = lookup("VOXKB_EMBEDDING_DIMENSION") {
            builder = builder.embedding_dimension(parse_var("VOXKB_EMBEDDING_DIMENSION", &raw)?);
        }
        if let Some(raw) = lookup("VOXKB_TOP_K") {
            builder = builder.top_k(parse_var("VOXKB_TOP_K", &raw)?);
        }
        if let Some(raw) = lookup("VOXKB_SIMILARITY_THRESHOLD") {
            builder =
                builder.similarity_threshold(parse_var("VOXKB_SIMILARITY_THRESHOLD", &raw)?);
        }
        if let Some(model) = lookup("VOXKB_CHAT_MODEL") {
            builder = builder.chat_model(model);
        }
        if let Some(path) = lookup("VOXKB_DB_PATH") {
            builder = builder.persist_path(path);
        }
        builder.build()
    }

    /// Validate that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.collection_name.trim().is_empty() {
            return Err(RagError::ConfigError("collection_name must not be empty".to_string()));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::ConfigError(
                "embedding_dimension must be greater than zero".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::ConfigError(format!(
                "similarity_threshold ({}) must be within [-1.0, 1.0]",
                self.similarity_threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must be within [0.0, 2.0]",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(RagError::ConfigError(format!(
                "top_p ({}) must be within (0.0, 1.0]",
                self.top_p
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RagError::ConfigError(format!("{key}: cannot parse '{raw}': {e}")))
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the collection name.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the stored embedding dimensionality.
    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding_dimension = dimension;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the context size bound in characters.
    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    /// Set the chat model name.
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = model.into();
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the nucleus sampling mass.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.config.top_p = top_p;
        self
    }

    /// Set the conversation used when none is given.
    pub fn default_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.config.default_conversation_id = id.into();
        self
    }

    /// Set the SQLite database location.
    pub fn persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persist_path = path.into();
        self
    }

    /// Set the query instruction template.
    pub fn query_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.query_instruction = instruction.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any field is out of range; see
    /// [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_knowledge_base_settings() {
        let config = RagConfig::default();
        assert_eq!(config.collection_name, "local_knowledge");
        assert_eq!(config.embedding_dimension, 1024);
        assert_eq!(config.top_k, 5);
        assert!((config.similarity_threshold - 0.3).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_rejects_zero_top_k() {
        let err = RagConfig::builder().top_k(0).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("top_k")));
    }

    #[test]
    fn builder_rejects_out_of_range_threshold() {
        assert!(RagConfig::builder().similarity_threshold(1.5).build().is_err());
        assert!(RagConfig::builder().similarity_threshold(-1.0).build().is_ok());
    }

    #[test]
    fn builder_rejects_zero_dimension() {
        assert!(RagConfig::builder().embedding_dimension(0).build().is_err());
    }

    #[test]
    fn env_overrides_are_applied() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("VOXKB_TOP_K", "3"),
            ("VOXKB_SIMILARITY_THRESHOLD", "0.5"),
            ("VOXKB_DB_PATH", "/tmp/kb.db"),
        ]);
        let config = RagConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.top_k, 3);
        assert!((config.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.persist_path, PathBuf::from("/tmp/kb.db"));
    }

    #[test]
    fn unparseable_env_value_is_config_error() {
        let err = RagConfig::from_lookup(|key| {
            (key == "VOXKB_EMBEDDING_DIMENSION").then(|| "wide".to_string())
        })
        .unwrap_err();
        assert!(
            matches!(err, RagError::ConfigError(msg) if msg.contains("VOXKB_EMBEDDING_DIMENSION"))
        );
    }
}
