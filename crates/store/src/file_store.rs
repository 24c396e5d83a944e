//! File-based conversation store.
//!
//! Each conversation is one pretty-printed JSON document named after its
//! storage key: `<dir>/conversation_<datetime>_<uuid>.json`. Simple,
//! portable, human-inspectable, and requires zero external dependencies.

use async_trait::async_trait;
use sidekick_core::conversation::Conversation;
use sidekick_core::error::StoreError;
use sidekick_core::repository::ConversationRepository;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A directory of JSON conversation documents.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given directory. The directory is
    /// created on first write.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default directory: `~/.sidekick/conversations/`.
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".sidekick").join("conversations")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl ConversationRepository for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, conversation: &Conversation) -> Result<String, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StoreError::Storage(format!("Failed to create conversations directory: {e}"))
        })?;

        let key = conversation.storage_key();
        let body = serde_json::to_string_pretty(conversation)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let path = self.path_for(&key);
        std::fs::write(&path, body)
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", path.display())))?;

        debug!(key = %key, path = %path.display(), "Conversation saved");
        Ok(key)
    }

    async fn load(&self, key: &str) -> Result<Option<Conversation>, StoreError> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        match serde_json::from_str(&raw) {
            Ok(conversation) => Ok(Some(conversation)),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping corrupted conversation document");
                Ok(None)
            }
        }
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Storage(format!("Failed to list store: {e}"))),
        };

        let mut keys: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_suffix(".json")
                    .filter(|stem| stem.starts_with("conversation_"))
                    .map(str::to_string)
            })
            .collect();

        keys.sort();
        Ok(keys)
    }
}
