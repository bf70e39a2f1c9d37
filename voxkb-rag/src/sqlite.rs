//! SQLite-backed durable vector store.
//!
//! Records live in a single SQLite file, so the knowledge base survives
//! process restarts. Search is brute-force cosine distance over the
//! collection's stored vectors.
//!
//! This module is only available when the `sqlite` feature is enabled.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::document::{DocumentRecord, Metadata, ScoredRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, cosine_distance, rank_nearest};

const BACKEND: &str = "SQLite";

fn db_err(e: sqlx::Error) -> RagError {
    RagError::store(BACKEND, e.to_string())
}

/// A [`VectorStore`] persisted to a SQLite database file.
///
/// # Example
///
/// ```rust,ignore
/// use voxkb_rag::sqlite::SqliteVectorStore;
///
/// let store = SqliteVectorStore::open("./knowledge_db/knowledge.db").await?;
/// store.create_collection("local_knowledge", 1024).await?;
/// ```
pub struct SqliteVectorStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteVectorStore {
    /// Open (or create) the database at `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the file cannot be opened or
    /// the schema cannot be created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::store(BACKEND, format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool, path };
        store.init_schema().await?;
        info!(path = %store.path.display(), "opened SQLite vector store");
        Ok(store)
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL DEFAULT 'cosine',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn dimension_of(&self, collection: &str) -> Result<Option<usize>> {
        let dimension: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?1")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(dimension.map(|d| d as usize))
    }

    async fn require_dimension(&self, collection: &str) -> Result<usize> {
        self.dimension_of(collection).await?.ok_or_else(|| {
            RagError::store(BACKEND, format!("collection '{collection}' does not exist"))
        })
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentRecord> {
        let metadata_str: String = row.try_get("metadata").map_err(db_err)?;
        let metadata: Metadata = serde_json::from_str(&metadata_str)
            .map_err(|e| RagError::store(BACKEND, format!("corrupt metadata: {e}")))?;
        let embedding: Vec<u8> = row.try_get("embedding").map_err(db_err)?;

        Ok(DocumentRecord {
            id: row.try_get("id").map_err(db_err)?,
            text: row.try_get("text").map_err(db_err)?,
            embedding: Self::deserialize_embedding(&embedding),
            metadata,
        })
    }
}

fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::store(
            BACKEND,
            format!("embedding has {actual} dimensions, collection expects {expected}"),
        ));
    }
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if let Some(existing) = self.dimension_of(name).await? {
            return check_dimensions(existing, dimensions);
        }
        sqlx::query("INSERT OR IGNORE INTO collections (name, dimension) VALUES (?1, ?2)")
            .bind(name)
            .bind(dimensions as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM records WHERE collection = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM collections WHERE name = ?1")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.dimension_of(name).await?.is_some())
    }

    async fn upsert(&self, collection: &str, records: &[DocumentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let dimension = self.require_dimension(collection).await?;
        for record in records {
            check_dimensions(dimension, record.embedding.len())?;
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for record in records {
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|e| RagError::store(BACKEND, format!("cannot encode metadata: {e}")))?;
            sqlx::query(
                "INSERT OR REPLACE INTO records (collection, id, text, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.text)
            .bind(&metadata)
            .bind(Self::serialize_embedding(&record.embedding))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        debug!(collection, count = records.len(), "upserted records");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let dimension = self.require_dimension(collection).await?;
        check_dimensions(dimension, embedding.len())?;

        let rows = sqlx::query(
            "SELECT id, text, metadata, embedding FROM records WHERE collection = ?1",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = Self::row_to_record(row)?;
            let distance = cosine_distance(&record.embedding, embedding);
            hits.push(ScoredRecord { record, distance });
        }
        Ok(rank_nearest(hits, top_k))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.require_dimension(collection).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{MetadataValue, default_metadata};

    fn record(id: &str, embedding: Vec<f32>) -> DocumentRecord {
        let mut metadata = default_metadata();
        metadata.insert("chunk_index".into(), MetadataValue::Int(7));
        DocumentRecord { id: id.to_string(), text: format!("passage {id}"), embedding, metadata }
    }

    #[tokio::test]
    async fn insert_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("kb.db")).await.unwrap();
        store.create_collection("kb", 3).await.unwrap();

        store
            .upsert("kb", &[record("c1", vec![1.0, 0.0, 0.0]), record("c2", vec![0.0, 1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count("kb").await.unwrap(), 2);

        let hits = store.search("kb", &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "c1");
        assert!(hits[0].distance < 0.01);
        assert_eq!(hits[0].record.metadata["chunk_index"], MetadataValue::Int(7));
        assert_eq!(hits[0].record.embedding, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kb.db");
        {
            let store = SqliteVectorStore::open(&path).await.unwrap();
            store.create_collection("kb", 2).await.unwrap();
            store.upsert("kb", &[record("c1", vec![0.6, 0.8])]).await.unwrap();
        }

        let reopened = SqliteVectorStore::open(&path).await.unwrap();
        assert!(reopened.collection_exists("kb").await.unwrap());
        assert_eq!(reopened.count("kb").await.unwrap(), 1);
        assert!(reopened.create_collection("kb", 2).await.is_ok());
        assert!(reopened.create_collection("kb", 4).await.is_err());
    }

    #[tokio::test]
    async fn delete_collection_drops_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("kb.db")).await.unwrap();
        store.create_collection("kb", 2).await.unwrap();
        store.upsert("kb", &[record("c1", vec![1.0, 0.0])]).await.unwrap();

        store.delete_collection("kb").await.unwrap();
        assert!(!store.collection_exists("kb").await.unwrap());

        store.create_collection("kb", 2).await.unwrap();
        assert_eq!(store.count("kb").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("kb.db")).await.unwrap();
        store.create_collection("kb", 2).await.unwrap();
        assert!(store.upsert("kb", &[record("c1", vec![1.0, 0.0, 0.0])]).await.is_err());
        assert!(store.search("kb", &[1.0], 1).await.is_err());
    }
}
