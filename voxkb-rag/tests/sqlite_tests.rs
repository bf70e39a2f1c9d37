//! Knowledge base persistence across restarts on the SQLite backend.
#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::{ConceptEmbedder, knowledge_base_on};
use voxkb_rag::{MetadataValue, SqliteVectorStore};

#[tokio::test]
async fn knowledge_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge_db").join("knowledge.db");

    let ids = {
        let store = Arc::new(SqliteVectorStore::open(&path).await.unwrap());
        let kb = knowledge_base_on(Arc::new(ConceptEmbedder), store, 5, 0.3).await;
        kb.add(&["Dogs are mammals.".to_string(), "FastAPI is a web framework.".to_string()], None)
            .await
            .unwrap()
    };

    let store = Arc::new(SqliteVectorStore::open(&path).await.unwrap());
    let kb = knowledge_base_on(Arc::new(ConceptEmbedder), store, 5, 0.3).await;

    let stats = kb.stats().await.unwrap();
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.collection_name, "local_knowledge");

    let hits = kb.search("tell me about dogs", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document, "Dogs are mammals.");
    assert!(ids.contains(&hits[0].id));
    assert_eq!(hits[0].metadata["source"], MetadataValue::from("manual"));
}

#[tokio::test]
async fn reset_clears_durable_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge.db");

    {
        let store = Arc::new(SqliteVectorStore::open(&path).await.unwrap());
        let kb = knowledge_base_on(Arc::new(ConceptEmbedder), store, 5, 0.3).await;
        kb.add(&["Dogs are mammals.".to_string()], None).await.unwrap();
        kb.reset().await.unwrap();
        assert_eq!(kb.stats().await.unwrap().total_documents, 0);
        kb.add(&["Python is a programming language.".to_string()], None).await.unwrap();
    }

    let store = Arc::new(SqliteVectorStore::open(&path).await.unwrap());
    let kb = knowledge_base_on(Arc::new(ConceptEmbedder), store, 5, 0.3).await;
    assert_eq!(kb.stats().await.unwrap().total_documents, 1);
    assert!(kb.search("dogs", 5).await.unwrap().is_empty());
}
