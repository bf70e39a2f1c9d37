//! The knowledge base: embedding plus a named vector store collection.
//!
//! [`KnowledgeBase`] is the text-level face of the store. Callers hand it
//! passages and queries; it embeds them, generates record IDs, converts
//! backend distances into similarities, and applies the relevance threshold.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::document::{DocumentRecord, Metadata, RetrievalResult, StoreStats, default_metadata};
use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// A named, embedding-aware collection of passages.
///
/// Construct it with [`KnowledgeBase::open`], which reuses an existing
/// collection or creates one, so the caller never distinguishes a first
/// run from a restart.
///
/// # Example
///
/// ```rust,ignore
/// let kb = KnowledgeBase::open(config, embeddings, Arc::new(store)).await?;
/// let ids = kb.add(&["Dogs are mammals.".to_string()], None).await?;
/// let hits = kb.search("what is a dog?", 5).await?;
/// ```
pub struct KnowledgeBase {
    config: RagConfig,
    embeddings: EmbeddingService,
    store: Arc<dyn VectorStore>,
}

impl KnowledgeBase {
    /// Open the configured collection, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the backend is unavailable or
    /// the existing collection has a different dimensionality.
    pub async fn open(
        config: RagConfig,
        embeddings: EmbeddingService,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        config.validate()?;
        if embeddings.dimension() != config.embedding_dimension {
            return Err(RagError::ConfigError(format!(
                "embedding service dimension {} does not match configured {}",
                embeddings.dimension(),
                config.embedding_dimension
            )));
        }

        let kb = Self { config, embeddings, store };
        kb.init_collection().await?;
        Ok(kb)
    }

    async fn init_collection(&self) -> Result<()> {
        let name = &self.config.collection_name;
        if self.store.collection_exists(name).await? {
            self.store.create_collection(name, self.config.embedding_dimension).await?;
            let count = self.store.count(name).await?;
            info!(collection = %name, count, "loaded existing collection");
        } else {
            self.store.create_collection(name, self.config.embedding_dimension).await?;
            info!(collection = %name, "created new knowledge collection");
        }
        Ok(())
    }

    /// The configuration this knowledge base was opened with.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Embed and store passages, returning one fresh ID per passage.
    ///
    /// Passages without metadata get `{"source": "manual", "type": "document"}`.
    /// An empty `documents` slice is a no-op returning no IDs.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InputError`] if `metadatas` has a different length
    /// than `documents` or a passage is blank, and propagates embedding and
    /// store failures.
    pub async fn add(
        &self,
        documents: &[String],
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(metadatas) = &metadatas {
            if metadatas.len() != documents.len() {
                return Err(RagError::InputError(format!(
                    "got {} metadata entries for {} documents",
                    metadatas.len(),
                    documents.len()
                )));
            }
        }
        if let Some(index) = documents.iter().position(|d| d.trim().is_empty()) {
            return Err(RagError::InputError(format!("document {index} is empty")));
        }

        info!(count = documents.len(), "adding documents to knowledge base");

        let texts: Vec<&str> = documents.iter().map(String::as_str).collect();
        let embeddings = self.embeddings.encode_documents(&texts).await?;
        let metadatas =
            metadatas.unwrap_or_else(|| documents.iter().map(|_| default_metadata()).collect());

        let records: Vec<DocumentRecord> = documents
            .iter()
            .zip(embeddings)
            .zip(metadatas)
            .map(|((text, embedding), metadata)| DocumentRecord {
                id: Uuid::new_v4().to_string(),
                text: text.clone(),
                embedding,
                metadata,
            })
            .collect();

        self.store.upsert(&self.config.collection_name, &records).await?;
        self.embeddings.release_cache();

        info!(count = records.len(), "added documents");
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Find up to `top_k` passages relevant to `query`.
    ///
    /// Similarity is `1 - cosine distance`. Results below the configured
    /// threshold are dropped; the rest are ordered by descending similarity.
    /// An empty collection yields an empty list.
    ///
    /// # Errors
    ///
    /// Propagates embedding and store failures.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        debug!(query = %preview(query), top_k, "searching knowledge base");

        let embedding = self.embeddings.encode_query(query).await?;
        let hits = self.store.search(&self.config.collection_name, &embedding, top_k).await?;

        let threshold = self.config.similarity_threshold;
        let results: Vec<RetrievalResult> = hits
            .into_iter()
            .map(RetrievalResult::from_scored)
            .filter(|r| r.similarity >= threshold)
            .collect();

        info!(result_count = results.len(), "found relevant documents");
        Ok(results)
    }

    /// Report collection size and embedding configuration.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_documents: self.store.count(&self.config.collection_name).await?,
            collection_name: self.config.collection_name.clone(),
            embedding_model: self.embeddings.model().to_string(),
            embedding_dimension: self.config.embedding_dimension,
        })
    }

    /// Irreversibly delete every record, leaving an empty, usable collection.
    ///
    /// Not meant to race normal traffic: a concurrent search may observe a
    /// partially cleared collection.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn reset(&self) -> Result<()> {
        warn!(collection = %self.config.collection_name, "resetting knowledge base");
        self.store.delete_collection(&self.config.collection_name).await?;
        self.init_collection().await?;
        info!("knowledge base reset complete");
        Ok(())
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::document::MetadataValue;
    use crate::embedding::EmbeddingProvider;
    use crate::inmemory::InMemoryVectorStore;

    /// One axis per letter of the alphabet, counting occurrences.
    struct LetterProvider;

    #[async_trait]
    impl EmbeddingProvider for LetterProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.rsplit("Query: ").next().unwrap_or(text);
            let mut v = vec![0.0; 26];
            for b in text.bytes().filter(u8::is_ascii_lowercase) {
                v[(b - b'a') as usize] += 1.0;
            }
            v[0] += 0.01;
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            26
        }
    }

    async fn open_kb(threshold: f32) -> KnowledgeBase {
        let config = RagConfig::builder()
            .embedding_dimension(26)
            .similarity_threshold(threshold)
            .build()
            .unwrap();
        let embeddings = EmbeddingService::new(Arc::new(LetterProvider), &config).unwrap();
        KnowledgeBase::open(config, embeddings, Arc::new(InMemoryVectorStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_generates_unique_ids_and_default_metadata() {
        let kb = open_kb(-1.0).await;
        let ids = kb.add(&["xyz".to_string(), "xyz".to_string()], None).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let hits = kb.search("xyz", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata["source"], MetadataValue::from("manual"));
        assert_eq!(hits[0].metadata["type"], MetadataValue::from("document"));
    }

    #[tokio::test]
    async fn empty_add_is_a_no_op() {
        let kb = open_kb(0.0).await;
        assert!(kb.add(&[], None).await.unwrap().is_empty());
        assert_eq!(kb.stats().await.unwrap().total_documents, 0);
    }

    #[tokio::test]
    async fn mismatched_metadata_is_rejected() {
        let kb = open_kb(0.0).await;
        let err = kb.add(&["abc".to_string()], Some(vec![])).await.unwrap_err();
        assert!(matches!(err, RagError::InputError(_)));
        assert!(matches!(
            kb.add(&["  ".to_string()], None).await.unwrap_err(),
            RagError::InputError(_)
        ));
    }

    #[tokio::test]
    async fn threshold_drops_unrelated_passages() {
        let kb = open_kb(0.5).await;
        kb.add(&["ccc".to_string(), "zzz".to_string()], None).await.unwrap();

        let hits = kb.search("ccc", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document, "ccc");
        assert!(hits[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn search_on_empty_collection_is_empty() {
        let kb = open_kb(0.0).await;
        assert!(kb.search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_empties_and_stays_usable() {
        let kb = open_kb(0.0).await;
        kb.add(&["abc".to_string()], None).await.unwrap();
        kb.reset().await.unwrap();

        let stats = kb.stats().await.unwrap();
        assert_eq!(stats.total_documents, 0);
        assert_eq!(stats.collection_name, "local_knowledge");
        assert_eq!(stats.embedding_dimension, 26);

        kb.add(&["def".to_string()], None).await.unwrap();
        assert_eq!(kb.stats().await.unwrap().total_documents, 1);
    }
}
