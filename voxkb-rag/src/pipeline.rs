//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] answers queries by composing a [`Retriever`], a
//! [`ChatModel`], and a [`ConversationStore`], and exposes ingestion through
//! the shared [`KnowledgeBase`].
//!
//! # Example
//!
//! ```rust,ignore
//! use voxkb_rag::{KnowledgeBase, RagPipeline, OpenAIChatModel};
//!
//! let pipeline = RagPipeline::builder()
//!     .knowledge_base(Arc::new(kb))
//!     .chat_model(Arc::new(OpenAIChatModel::from_env("gpt-4o-mini")?))
//!     .build()?;
//!
//! pipeline.add_knowledge(&["Dogs are mammals.".to_string()], None).await;
//! let answer = pipeline.generate_response("What is a dog?", Some("user-1"), None).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::RagConfig;
use crate::conversation::{ConversationLocks, ConversationStore, InMemoryConversationStore, Turn};
use crate::document::{Metadata, RetrievalResult, StoreStats};
use crate::error::{RagError, Result};
use crate::knowledge::KnowledgeBase;
use crate::llm::{ChatModel, GenerationOptions};
use crate::prompt::{build_context, build_messages, build_system_prompt};
use crate::retriever::{KnowledgeRetriever, Retriever};

/// The answer to one query, with the passages it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagResponse {
    /// Generated answer, or an apology carrying the error text on failure.
    pub response: String,
    /// Passages supplied as context, numbered as in the prompt; empty on failure.
    pub sources: Vec<RetrievalResult>,
    /// Tokens reported by the model; `0` on failure.
    pub tokens_used: u32,
    /// Name of the model that answered; `None` on failure.
    pub model_used: Option<String>,
    /// Whether the model call succeeded.
    pub success: bool,
}

impl RagResponse {
    /// Similarity of each source, in rank order.
    pub fn relevance_scores(&self) -> Vec<f32> {
        self.sources.iter().map(|s| s.similarity).collect()
    }

    /// Number of sources supplied as context.
    pub fn sources_used(&self) -> usize {
        self.sources.len()
    }

    fn failed(err: &RagError) -> Self {
        Self {
            response: format!(
                "I apologize, but I encountered an error while processing your request: {err}"
            ),
            sources: Vec::new(),
            tokens_used: 0,
            model_used: None,
            success: false,
        }
    }
}

/// Outcome of [`RagPipeline::add_knowledge`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionReport {
    /// Whether every passage was stored.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// IDs of the stored passages, in input order.
    pub document_ids: Vec<String>,
    /// Collection statistics after the add; `None` on failure.
    pub stats: Option<StoreStats>,
}

/// The RAG orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. Calls for the same
/// conversation ID are serialized; distinct IDs run concurrently.
pub struct RagPipeline {
    config: RagConfig,
    knowledge: Arc<KnowledgeBase>,
    retriever: Arc<dyn Retriever>,
    chat_model: Arc<dyn ChatModel>,
    conversations: Arc<dyn ConversationStore>,
    locks: ConversationLocks,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the knowledge base.
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    /// Answer `query` from the knowledge base and the conversation so far.
    ///
    /// `None` for `conversation_id` uses the configured default
    /// conversation. A model failure is returned as `success == false` and
    /// leaves the history untouched.
    ///
    /// # Errors
    ///
    /// Retrieval and conversation-store failures propagate.
    #[instrument(skip_all, fields(conversation_id = tracing::field::Empty))]
    pub async fn generate_response(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        system_instruction: Option<&str>,
    ) -> Result<RagResponse> {
        let conversation_id = conversation_id.unwrap_or(&self.config.default_conversation_id);
        tracing::Span::current().record("conversation_id", conversation_id);

        let _guard = self.locks.acquire(conversation_id).await;

        let history = self.conversations.get_history(conversation_id).await?;
        let mut sources = self.retriever.retrieve(query, None).await?;

        let (context, kept) = build_context(&sources, self.config.max_context_chars);
        sources.truncate(kept);
        let system_prompt = build_system_prompt(system_instruction, &context);
        let messages = build_messages(system_prompt, &history, query);

        let options = GenerationOptions::from(&self.config);
        let completion = match self.chat_model.complete(&messages, &options).await {
            Ok(completion) => completion,
            Err(e) => {
                error!(model = self.chat_model.name(), error = %e, "generation failed");
                return Ok(RagResponse::failed(&e));
            }
        };

        self.conversations
            .append(conversation_id, Turn::user(query), Turn::assistant(completion.text.clone()))
            .await?;

        info!(
            sources = sources.len(),
            tokens_used = completion.tokens_used,
            history_turns = history.len() + 2,
            "generated response"
        );

        Ok(RagResponse {
            response: completion.text,
            sources,
            tokens_used: completion.tokens_used,
            model_used: Some(self.chat_model.name().to_string()),
            success: true,
        })
    }

    /// Store pre-chunked passages and report the resulting collection stats.
    ///
    /// Never fails: errors from the knowledge base are reported as
    /// `success == false` with the error text in `message`.
    pub async fn add_knowledge(
        &self,
        documents: &[String],
        metadatas: Option<Vec<Metadata>>,
    ) -> IngestionReport {
        ingest_passages(&self.knowledge, documents, metadatas).await
    }

    /// Knowledge-base statistics.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.knowledge.stats().await
    }

    /// Empty the knowledge base. Conversation histories are kept.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn reset(&self) -> Result<()> {
        self.knowledge.reset().await
    }

    /// The recorded turns of a conversation.
    ///
    /// # Errors
    ///
    /// Propagates conversation-store failures.
    pub async fn history(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        self.conversations.get_history(conversation_id).await
    }
}

/// Add passages to `knowledge` and summarize the outcome.
///
/// Backs [`RagPipeline::add_knowledge`]; ingestion-only callers with no
/// chat model can use it directly.
pub async fn ingest_passages(
    knowledge: &KnowledgeBase,
    documents: &[String],
    metadatas: Option<Vec<Metadata>>,
) -> IngestionReport {
    let outcome = async {
        let ids = knowledge.add(documents, metadatas).await?;
        let stats = knowledge.stats().await?;
        Ok::<_, RagError>((ids, stats))
    }
    .await;

    match outcome {
        Ok((document_ids, stats)) => IngestionReport {
            success: true,
            message: format!("Successfully added {} documents", document_ids.len()),
            document_ids,
            stats: Some(stats),
        },
        Err(e) => {
            error!(error = %e, "failed to add documents");
            IngestionReport {
                success: false,
                message: format!("Failed to add documents: {e}"),
                document_ids: Vec::new(),
                stats: None,
            }
        }
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `knowledge_base` and `chat_model` are required. The retriever defaults
/// to a [`KnowledgeRetriever`] over the knowledge base, the conversation
/// store to an [`InMemoryConversationStore`], and the configuration to the
/// knowledge base's own.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .knowledge_base(kb)
///     .chat_model(Arc::new(model))
///     .conversations(Arc::new(InMemoryConversationStore::new()))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    knowledge: Option<Arc<KnowledgeBase>>,
    retriever: Option<Arc<dyn Retriever>>,
    chat_model: Option<Arc<dyn ChatModel>>,
    conversations: Option<Arc<dyn ConversationStore>>,
}

impl RagPipelineBuilder {
    /// Override the settings taken from the knowledge base.
    ///
    /// The default retriever follows the override's `top_k` and
    /// `similarity_threshold`. The knowledge base still applies its own
    /// threshold first, so a lower override cannot surface more passages.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the knowledge base.
    pub fn knowledge_base(mut self, knowledge: Arc<KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Set a custom retriever.
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the chat model.
    pub fn chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.chat_model = Some(model);
        self
    }

    /// Set the conversation store.
    pub fn conversations(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let knowledge = self
            .knowledge
            .ok_or_else(|| RagError::ConfigError("knowledge_base is required".to_string()))?;
        let chat_model = self
            .chat_model
            .ok_or_else(|| RagError::ConfigError("chat_model is required".to_string()))?;

        let config = self.config.unwrap_or_else(|| knowledge.config().clone());
        config.validate()?;

        let retriever = self.retriever.unwrap_or_else(|| {
            Arc::new(
                KnowledgeRetriever::new(Arc::clone(&knowledge))
                    .with_top_k(config.top_k)
                    .with_threshold(config.similarity_threshold),
            )
        });
        let conversations =
            self.conversations.unwrap_or_else(|| Arc::new(InMemoryConversationStore::new()));

        Ok(RagPipeline {
            config,
            knowledge,
            retriever,
            chat_model,
            conversations,
            locks: ConversationLocks::default(),
        })
    }
}
