//! Retriever contract between the pipeline and the knowledge base.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use crate::document::RetrievalResult;
use crate::error::Result;
use crate::knowledge::KnowledgeBase;

/// Produces ranked, thresholded passages for a query.
///
/// Every implementation returns at most `top_k` results, none below its
/// similarity threshold, ordered by descending similarity.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve passages for `query`. `None` uses the retriever's default `top_k`.
    async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<RetrievalResult>>;
}

/// A [`Retriever`] over a [`KnowledgeBase`].
///
/// Re-applies the ordering and threshold guarantees to whatever the
/// underlying store returned, so a backend with looser ranking still
/// satisfies the contract.
pub struct KnowledgeRetriever {
    knowledge: Arc<KnowledgeBase>,
    default_top_k: usize,
    threshold: f32,
}

impl KnowledgeRetriever {
    /// Create a retriever using the knowledge base's configured `top_k` and threshold.
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        let default_top_k = knowledge.config().top_k;
        let threshold = knowledge.config().similarity_threshold;
        Self { knowledge, default_top_k, threshold }
    }

    /// Override the default `top_k`.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    /// Override the similarity threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl Retriever for KnowledgeRetriever {
    async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<RetrievalResult>> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let results = self.knowledge.search(query, top_k).await?;
        Ok(enforce_ranking(results, self.threshold, top_k))
    }
}

/// Drop results below `threshold`, sort by descending similarity, keep `top_k`.
pub fn enforce_ranking(
    results: Vec<RetrievalResult>,
    threshold: f32,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let mut results: Vec<RetrievalResult> =
        results.into_iter().filter(|r| r.similarity >= threshold).collect();
    results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
    results.truncate(top_k);
    results
}
