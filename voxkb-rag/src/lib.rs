//! # voxkb-rag
//!
//! Retrieval-augmented response generation over a local knowledge base.
//!
//! ## Overview
//!
//! Passages are embedded and stored in a named collection; each query is
//! embedded through an instruction template, matched against the stored
//! passages by cosine similarity, and the surviving sources are handed to a
//! chat model together with the conversation so far.
//!
//! - [`EmbeddingService`] - asymmetric query/document embedding with Matryoshka truncation
//! - [`KnowledgeBase`] - add, search, stats, and reset over a [`VectorStore`]
//! - [`Retriever`] - ranked, thresholded passages for the orchestrator
//! - [`ConversationStore`] - append-only per-conversation history
//! - [`RagPipeline`] - grounded answers and knowledge ingestion
//!
//! ## Vector stores
//!
//! | Backend | Feature | Lifetime |
//! |---------|---------|----------|
//! | [`InMemoryVectorStore`] | always | process |
//! | [`SqliteVectorStore`] | `sqlite` | durable file |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxkb_rag::*;
//!
//! let config = RagConfig::from_env()?;
//! let provider = Arc::new(OpenAIEmbeddingProvider::from_env()?);
//! let embeddings = EmbeddingService::new(provider, &config)?;
//! let store = Arc::new(SqliteVectorStore::open(&config.persist_path).await?);
//! let kb = Arc::new(KnowledgeBase::open(config.clone(), embeddings, store).await?);
//!
//! let pipeline = RagPipeline::builder()
//!     .knowledge_base(kb)
//!     .chat_model(Arc::new(OpenAIChatModel::from_env(&config.chat_model)?))
//!     .build()?;
//!
//! let answer = pipeline.generate_response("Tell me about Python", None, None).await?;
//! println!("{}", answer.response);
//! ```

pub mod chunking;
pub mod config;
pub mod conversation;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod knowledge;
pub mod llm;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod vectorstore;

pub use chunking::{Chunker, ParagraphChunker, Passage, decode_text};
pub use config::{RagConfig, RagConfigBuilder};
pub use conversation::{ConversationStore, InMemoryConversationStore, Role, Turn};
pub use document::{
    DocumentRecord, Metadata, MetadataValue, RetrievalResult, ScoredRecord, StoreStats,
    default_metadata,
};
pub use embedding::{EmbeddingProvider, EmbeddingService};
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use knowledge::KnowledgeBase;
pub use llm::{ChatCompletion, ChatModel, GenerationOptions};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
pub use pipeline::{
    IngestionReport, RagPipeline, RagPipelineBuilder, RagResponse, ingest_passages,
};
pub use retriever::{KnowledgeRetriever, Retriever};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteVectorStore;
pub use vectorstore::VectorStore;
