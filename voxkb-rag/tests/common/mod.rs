//! Deterministic embedders and chat models shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use voxkb_rag::{
    ChatCompletion, ChatModel, EmbeddingProvider, EmbeddingService, GenerationOptions,
    InMemoryVectorStore, KnowledgeBase, RagConfig, RagError, Result, Role, Turn, VectorStore,
};

/// The text a provider sees for a query has the instruction template in front of it.
fn strip_instruction(text: &str) -> &str {
    text.rsplit("Query: ").next().unwrap_or(text)
}

/// Four concept axes: python, tech, animal, other. Each axis is set when
/// any of its keywords appears, so overlap is purely topical.
pub struct ConceptEmbedder;

impl ConceptEmbedder {
    pub const DIM: usize = 4;

    const PYTHON: &'static [&'static str] = &["python"];
    const TECH: &'static [&'static str] =
        &["python", "programming", "language", "framework", "fastapi", "web"];
    const ANIMAL: &'static [&'static str] = &["dog", "dogs", "mammal", "mammals", "cat"];
}

#[async_trait]
impl EmbeddingProvider for ConceptEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = strip_instruction(text).to_lowercase();
        let words: Vec<&str> =
            text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
        let has = |keywords: &[&str]| words.iter().any(|w| keywords.contains(w));

        let mut v = vec![0.0; Self::DIM];
        if has(Self::PYTHON) {
            v[0] = 1.0;
        }
        if has(Self::TECH) {
            v[1] = 1.0;
        }
        if has(Self::ANIMAL) {
            v[2] = 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[3] = 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        Self::DIM
    }

    fn name(&self) -> &str {
        "concept"
    }
}

/// Pseudo-random vectors seeded from the text, so equal text embeds equally.
pub struct HashEmbedder {
    pub dim: usize,
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = strip_instruction(text);
        let mut state = text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3)
        });
        let mut v = Vec::with_capacity(self.dim);
        for _ in 0..self.dim {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            v.push(((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0);
        }
        v[0] += 0.01;
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}

/// Open a knowledge base over an in-memory store.
pub async fn knowledge_base(
    provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    threshold: f32,
) -> Arc<KnowledgeBase> {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    knowledge_base_on(provider, store, top_k, threshold).await
}

pub async fn knowledge_base_on(
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    threshold: f32,
) -> Arc<KnowledgeBase> {
    let config = RagConfig::builder()
        .embedding_dimension(provider.dimensions())
        .top_k(top_k)
        .similarity_threshold(threshold)
        .build()
        .unwrap();
    let embeddings = EmbeddingService::new(provider, &config).unwrap();
    Arc::new(KnowledgeBase::open(config, embeddings, store).await.unwrap())
}

/// Chat model that records every message list it receives.
#[derive(Default)]
pub struct RecordingChatModel {
    calls: Mutex<Vec<Vec<Turn>>>,
    failing: AtomicBool,
}

impl RecordingChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().unwrap().clone()
    }

    /// The system turn of the most recent call.
    pub fn last_system_prompt(&self) -> String {
        let calls = self.calls.lock().unwrap();
        let last = calls.last().expect("no model call recorded");
        assert_eq!(last[0].role, Role::System);
        last[0].content.clone()
    }
}

#[async_trait]
impl ChatModel for RecordingChatModel {
    fn name(&self) -> &str {
        "stub-model"
    }

    async fn complete(
        &self,
        messages: &[Turn],
        _options: &GenerationOptions,
    ) -> Result<ChatCompletion> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            calls.len()
        };
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::ModelError {
                provider: "stub-model".to_string(),
                message: "quota exceeded".to_string(),
            });
        }
        Ok(ChatCompletion { text: format!("answer {call}"), tokens_used: 42 })
    }
}
