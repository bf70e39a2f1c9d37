//! Error types for the `voxkb-rag` crate.

use thiserror::Error;

/// Errors that can occur in knowledge-base and generation operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding model failed or returned malformed output.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language-model call failed.
    ///
    /// [`RagPipeline::generate_response`](crate::RagPipeline::generate_response)
    /// absorbs this variant into an unsuccessful [`RagResponse`](crate::RagResponse).
    #[error("Model error ({provider}): {message}")]
    ModelError {
        /// The chat model that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The caller supplied inconsistent or empty input.
    #[error("Invalid input: {0}")]
    InputError(String),

    /// A configuration validation error or missing credential.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Raw text could not be turned into passages.
    #[error("Chunking error: {0}")]
    ChunkingError(String),
}

impl RagError {
    pub(crate) fn store(backend: &str, message: impl Into<String>) -> Self {
        RagError::VectorStoreError { backend: backend.to_string(), message: message.into() }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::EmbeddingError { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn model(provider: &str, message: impl Into<String>) -> Self {
        RagError::ModelError { provider: provider.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
