//! Turning raw uploaded text into knowledge-base passages.
//!
//! This module provides the [`Chunker`] trait, the [`ParagraphChunker`]
//! used for file uploads, and [`decode_text`] for byte input of unknown
//! encoding. The knowledge base itself never chunks; these helpers sit on
//! the ingestion side and feed [`RagPipeline::add_knowledge`](crate::RagPipeline::add_knowledge).

use crate::document::{Metadata, MetadataValue};
use crate::error::{RagError, Result};

/// A passage ready for ingestion, with its per-chunk metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    /// The passage text, trimmed.
    pub text: String,
    /// Metadata to store alongside the passage.
    pub metadata: Metadata,
}

/// A strategy for splitting text into passages.
pub trait Chunker: Send + Sync {
    /// Split `text` from `source` into passages.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if no usable passage remains.
    fn chunk(&self, text: &str, source: &str) -> Result<Vec<Passage>>;
}

/// Splits text on blank lines and keeps paragraphs long enough to stand alone.
///
/// Each passage gets `{"source", "chunk_index", "upload_type": "file"}`
/// metadata; `chunk_index` counts kept paragraphs from zero.
///
/// # Example
///
/// ```rust,ignore
/// use voxkb_rag::ParagraphChunker;
///
/// let passages = ParagraphChunker::default().chunk(&text, "handbook.txt")?;
/// let (documents, metadatas) = ParagraphChunker::into_parts(passages);
/// pipeline.add_knowledge(&documents, Some(metadatas)).await;
/// ```
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    min_chars: usize,
}

impl ParagraphChunker {
    /// Paragraphs of this many characters or fewer are dropped by default.
    pub const DEFAULT_MIN_CHARS: usize = 50;

    /// Create a chunker keeping paragraphs strictly longer than `min_chars`.
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    /// Split passages into the parallel text and metadata lists `add` expects.
    pub fn into_parts(passages: Vec<Passage>) -> (Vec<String>, Vec<Metadata>) {
        passages.into_iter().map(|p| (p.text, p.metadata)).unzip()
    }
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_CHARS)
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str, source: &str) -> Result<Vec<Passage>> {
        if text.trim().is_empty() {
            return Err(RagError::ChunkingError("no valid content found".to_string()));
        }

        let passages: Vec<Passage> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| p.chars().count() > self.min_chars)
            .enumerate()
            .map(|(chunk_index, paragraph)| Passage {
                text: paragraph.to_string(),
                metadata: Metadata::from([
                    ("source".to_string(), MetadataValue::from(source)),
                    ("chunk_index".to_string(), MetadataValue::from(chunk_index)),
                    ("upload_type".to_string(), MetadataValue::from("file")),
                ]),
            })
            .collect();

        if passages.is_empty() {
            return Err(RagError::ChunkingError(format!(
                "no paragraph longer than {} characters",
                self.min_chars
            )));
        }

        tracing::debug!(source, passages = passages.len(), "split text into paragraphs");
        Ok(passages)
    }
}

/// Decode uploaded bytes as UTF-8, falling back to Latin-1.
///
/// Latin-1 maps every byte to a code point, so decoding never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}
