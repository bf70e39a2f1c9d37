//! Per-conversation dialogue history.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::error::Result;

/// Who spoke a [`Turn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction given to the model.
    System,
    /// The person asking.
    User,
    /// The model's answer.
    Assistant,
}

impl Role {
    /// The wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message in a dialogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// The speaker.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl Turn {
    /// A system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Append-only storage of conversation histories keyed by conversation ID.
///
/// The in-process [`InMemoryConversationStore`] is the default; a shared
/// external store can implement the same trait for multi-process setups.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The ordered turns of a conversation; empty for an unknown ID.
    async fn get_history(&self, conversation_id: &str) -> Result<Vec<Turn>>;

    /// Append one user turn followed by one assistant turn.
    async fn append(&self, conversation_id: &str, user: Turn, assistant: Turn) -> Result<()>;
}

/// Conversation histories held in memory for the process lifetime.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<Turn>>>,
}

impl InMemoryConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations seen so far.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Whether no conversation has been recorded yet.
    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_history(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        Ok(self.conversations.read().await.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn append(&self, conversation_id: &str, user: Turn, assistant: Turn) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let history = conversations.entry(conversation_id.to_string()).or_default();
        history.push(user);
        history.push(assistant);
        debug!(conversation_id, turns = history.len(), "appended exchange");
        Ok(())
    }
}

/// One async mutex per conversation ID.
///
/// Holding a conversation's guard across read → generate → append keeps
/// concurrent exchanges on the same ID from interleaving; distinct IDs
/// never wait on each other. Entries nobody holds or waits on are dropped
/// on the next acquire, so the map only tracks conversations in flight.
#[derive(Debug, Default)]
pub(crate) struct ConversationLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    pub(crate) async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // guards and waiters each hold a clone
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(conversation_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let store = InMemoryConversationStore::new();
        assert!(store.get_history("nobody").await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn append_keeps_order_per_conversation() {
        let store = InMemoryConversationStore::new();
        store.append("a", Turn::user("q1"), Turn::assistant("r1")).await.unwrap();
        store.append("b", Turn::user("other"), Turn::assistant("reply")).await.unwrap();
        store.append("a", Turn::user("q2"), Turn::assistant("r2")).await.unwrap();

        let history = store.get_history("a").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "r1", "q2", "r2"]);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[tokio::test]
    async fn same_conversation_lock_is_exclusive() {
        let locks = ConversationLocks::default();
        let guard = locks.acquire("a").await;
        let other = locks.acquire("b").await;
        drop(other);

        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), locks.acquire("a"));
        assert!(pending.await.is_err());
        drop(guard);
        let _again = locks.acquire("a").await;
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = ConversationLocks::default();
        for i in 0..50 {
            drop(locks.acquire(&format!("conversation-{i}")).await);
        }
        assert!(locks.tracked() <= 1);

        let held = locks.acquire("held").await;
        drop(locks.acquire("passing").await);
        let _next = locks.acquire("next").await;
        // "held" survives pruning while its guard is alive
        assert_eq!(locks.tracked(), 2);
        drop(held);
    }
}
