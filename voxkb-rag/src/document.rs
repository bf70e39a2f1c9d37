//! Data types for stored passages, metadata, and retrieval results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A primitive metadata value.
///
/// Metadata is deliberately schemaless: ingestion sources attach whatever
/// keys they like (`source`, `chunk_index`, `upload_type`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Text(String),
}

impl MetadataValue {
    /// Return the value as a string slice if it is [`MetadataValue::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{v}"),
            MetadataValue::Int(v) => write!(f, "{v}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

/// String-keyed metadata attached to each stored passage.
pub type Metadata = HashMap<String, MetadataValue>;

/// Metadata synthesized for passages added without any.
pub fn default_metadata() -> Metadata {
    HashMap::from([
        ("source".to_string(), MetadataValue::from("manual")),
        ("type".to_string(), MetadataValue::from("document")),
    ])
}

/// A passage stored in a vector store collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Unique identifier, generated at insertion time.
    pub id: String,
    /// The passage text.
    pub text: String,
    /// The L2-normalized embedding of `text`.
    pub embedding: Vec<f32>,
    /// Open key-value metadata.
    pub metadata: Metadata,
}

/// A [`DocumentRecord`] returned by a backend search, with its cosine distance.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// The matched record.
    pub record: DocumentRecord,
    /// Cosine distance to the query (`1 - cosine similarity`), in `[0, 2]`.
    pub distance: f32,
}

/// A passage retrieved for a query, annotated with its relevance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// Identifier of the matched record.
    pub id: String,
    /// The passage text.
    pub document: String,
    /// Metadata copied from the matched record.
    pub metadata: Metadata,
    /// `1 - distance`; higher is more relevant.
    pub similarity: f32,
    /// The backend's cosine distance.
    pub distance: f32,
}

impl RetrievalResult {
    /// Convert a backend hit into a result using `similarity = 1 - distance`.
    pub fn from_scored(scored: ScoredRecord) -> Self {
        let ScoredRecord { record, distance } = scored;
        Self {
            id: record.id,
            document: record.text,
            metadata: record.metadata,
            similarity: 1.0 - distance,
            distance,
        }
    }

    /// The `source` metadata entry, if present.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(MetadataValue::as_str)
    }
}

/// Summary of a knowledge-base collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    /// Number of stored passages.
    pub total_documents: usize,
    /// Collection name.
    pub collection_name: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Stored embedding dimensionality.
    pub embedding_dimension: usize,
}
