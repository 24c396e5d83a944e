//! Conversation persistence trait.
//!
//! Persistence is optional: agents that have no repository simply skip the
//! save step after each completed turn.

use crate::conversation::Conversation;
use crate::error::StoreError;
use async_trait::async_trait;

/// Storage for completed conversations.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// A human-readable name for this store (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Persist a conversation, returning its storage key.
    async fn save(&self, conversation: &Conversation) -> Result<String, StoreError>;

    /// Load a conversation by storage key.
    async fn load(&self, key: &str) -> Result<Option<Conversation>, StoreError>;

    /// List all stored conversation keys.
    async fn list(&self) -> Result<Vec<String>, StoreError>;
}
