//! Embedding providers and the asymmetric embedding service built on them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the native dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Provider name used in errors and logs.
    fn name(&self) -> &str {
        "embedding"
    }

    /// Release any transient accelerator memory held between batches.
    fn release_cache(&self) {}
}

/// Turns passages and queries into fixed-length, L2-normalized vectors.
///
/// Documents are embedded as-is. Queries are wrapped in an instruction
/// template first, so both land in the same space through different text
/// transforms. Every vector is cut to the configured leading dimensions
/// (Matryoshka truncation) and re-normalized.
///
/// # Example
///
/// ```rust,ignore
/// let service = EmbeddingService::new(Arc::new(provider), &config)?;
/// let passages = service.encode_documents(&["Dogs are mammals."]).await?;
/// let query = service.encode_query("what is a dog?").await?;
/// ```
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    query_instruction: String,
    model: String,
}

impl EmbeddingService {
    /// Create a service truncating the provider's vectors to `config.embedding_dimension`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the provider's native dimensionality
    /// is smaller than the configured one.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Result<Self> {
        let native = provider.dimensions();
        if native < config.embedding_dimension {
            return Err(RagError::ConfigError(format!(
                "embedding provider '{}' produces {native} dimensions, fewer than the configured {}",
                provider.name(),
                config.embedding_dimension
            )));
        }
        Ok(Self {
            provider,
            dimension: config.embedding_dimension,
            query_instruction: config.query_instruction.clone(),
            model: config.embedding_model.clone(),
        })
    }

    /// The dimensionality of every vector this service returns.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The embedding model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Encode passages for storage. An empty input yields an empty output.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the provider fails or returns
    /// the wrong number of vectors or vectors that are too short.
    pub async fn encode_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = self.provider.name(), count = texts.len(), "encoding documents");

        let raw = self.provider.embed_batch(texts).await?;
        if raw.len() != texts.len() {
            return Err(RagError::embedding(
                self.provider.name(),
                format!("expected {} embeddings, got {}", texts.len(), raw.len()),
            ));
        }
        raw.into_iter().map(|v| self.project(v)).collect()
    }

    /// Encode a search query, wrapping it in the instruction template first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the provider fails.
    pub async fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        let formatted = self.format_query(query);
        let raw = self.provider.embed(&formatted).await?;
        self.project(raw)
    }

    /// The text actually embedded for `query`.
    pub fn format_query(&self, query: &str) -> String {
        format!("{}{query}", self.query_instruction)
    }

    /// Ask the provider to drop transient caches.
    pub fn release_cache(&self) {
        self.provider.release_cache();
    }

    fn project(&self, mut vector: Vec<f32>) -> Result<Vec<f32>> {
        if vector.len() < self.dimension {
            return Err(RagError::embedding(
                self.provider.name(),
                format!(
                    "embedding has {} dimensions, fewer than the configured {}",
                    vector.len(),
                    self.dimension
                ),
            ));
        }
        vector.truncate(self.dimension);
        if !normalize(&mut vector) {
            return Err(RagError::embedding(self.provider.name(), "embedding has zero magnitude"));
        }
        Ok(vector)
    }
}

/// L2-normalize `vector` in place. Returns `false` for zero or non-finite vectors.
pub(crate) fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return false;
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    true
}
