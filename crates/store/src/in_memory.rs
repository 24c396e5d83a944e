//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use sidekick_core::conversation::Conversation;
use sidekick_core::error::StoreError;
use sidekick_core::repository::ConversationRepository;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory repository keyed by storage key.
pub struct InMemoryStore {
    conversations: Arc<RwLock<BTreeMap<String, Conversation>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of stored conversations.
    pub async fn count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, conversation: &Conversation) -> Result<String, StoreError> {
        let key = conversation.storage_key();
        self.conversations
            .write()
            .await
            .insert(key.clone(), conversation.clone());
        Ok(key)
    }

    async fn load(&self, key: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.conversations.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_core::message::ChatMessage;

    #[tokio::test]
    async fn save_returns_storage_key() {
        let store = InMemoryStore::new();
        let mut conv = Conversation::new();
        conv.append(ChatMessage::user("hello"));

        let key = store.save(&conv).await.unwrap();
        assert_eq!(key, conv.storage_key());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn saving_twice_overwrites() {
        let store = InMemoryStore::new();
        let mut conv = Conversation::new();
        conv.append(ChatMessage::user("one"));
        store.save(&conv).await.unwrap();

        conv.append(ChatMessage::assistant("two"));
        let key = store.save(&conv).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.load("conversation_x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_all_keys() {
        let store = InMemoryStore::new();
        let conv_a = Conversation::new();
        let conv_b = Conversation::new();
        store.save(&conv_a).await.unwrap();
        store.save(&conv_b).await.unwrap();

        let keys = store.list().await.unwrap();
        assert_eq!(keys.len(), 2);
    }
}
