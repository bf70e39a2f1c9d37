//! Vector store trait for storing and searching passage embeddings.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::document::{DocumentRecord, ScoredRecord};
use crate::error::Result;

/// A storage backend for passage embeddings with cosine-distance search.
///
/// Implementations manage named collections of [`DocumentRecord`]s whose
/// embeddings all share the collection's dimensionality.
///
/// # Example
///
/// ```rust,ignore
/// use voxkb_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &records).await?;
/// let hits = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists with the same dimensionality.
    ///
    /// Returns an error if the collection exists with a different dimensionality.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its records. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Whether a named collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Insert records into a collection.
    ///
    /// Every embedding must match the collection's dimensionality.
    async fn upsert(&self, collection: &str, records: &[DocumentRecord]) -> Result<()>;

    /// Return up to `top_k` records nearest to `embedding`, by ascending cosine distance.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Number of records in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Cosine distance `1 - cos(a, b)`. Zero-magnitude vectors are at distance 1.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON {
        return 1.0;
    }
    (1.0 - dot / denom).clamp(0.0, 2.0)
}

/// Sort hits nearest-first and keep `top_k`.
pub(crate) fn rank_nearest(mut hits: Vec<ScoredRecord>, top_k: usize) -> Vec<ScoredRecord> {
    hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
    hits.truncate(top_k);
    hits
}
