//! Conversation and interaction tracking.
//!
//! A `Conversation` owns an append-only message log plus a derived list of
//! `Interaction` records — one per user turn. Appending a user message opens
//! a new interaction and returns its handle; appending an assistant message
//! closes out the current interaction by attaching the answer to it.
//!
//! Interactions move through a one-directional status machine:
//!
//! ```text
//! Start → Planning → Executing → (Reflecting) → Completed
//!                        ▲            │
//!                        └────────────┘  (revision requested)
//! ```
//!
//! Every transition is published on the conversation's event bus so a UI can
//! refresh without polling.

use crate::environment::Environment;
use crate::event::{DialogueEvent, EventBus};
use crate::message::{ChatMessage, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of one user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    /// Interaction created, nothing decided yet
    Start,
    /// Tool selection in progress
    Planning,
    /// A chosen action is running
    Executing,
    /// The answer is being critiqued
    Reflecting,
    /// The turn produced its final answer
    Completed,
}

impl InteractionStatus {
    /// Whether `next` is a legal successor of `self`.
    ///
    /// Transitions are one-directional, except that `Reflecting` may loop
    /// back to `Executing` when a revision is requested. `Planning` may be
    /// skipped (direct command execution) and a turn may complete straight
    /// from `Start` (canned replies).
    pub fn can_transition_to(self, next: InteractionStatus) -> bool {
        use InteractionStatus::*;
        matches!(
            (self, next),
            (Start, Planning)
                | (Start, Executing)
                | (Start, Completed)
                | (Planning, Executing)
                | (Planning, Completed)
                | (Executing, Reflecting)
                | (Executing, Completed)
                | (Reflecting, Executing)
                | (Reflecting, Completed)
        )
    }
}

/// The per-user-turn record of status, intent, and output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Current lifecycle status
    pub status: InteractionStatus,

    /// What the turn is trying to achieve (tool arguments, user phrasing)
    #[serde(default)]
    pub goal: String,

    /// The planned tool/action name
    #[serde(default)]
    pub intent: String,

    /// Arguments of the planned action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_arguments: Option<serde_json::Value>,

    /// Which agent handled this turn
    #[serde(default)]
    pub agent_name: String,

    /// Index of the triggering user message in the conversation log
    pub input_index: usize,

    /// Index of the assistant answer, once attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_index: Option<usize>,

    /// The page-context snapshot taken when the turn started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
}

impl Interaction {
    fn new(input_index: usize) -> Self {
        Self {
            status: InteractionStatus::Start,
            goal: String::new(),
            intent: String::new(),
            intent_arguments: None,
            agent_name: String::new(),
            input_index,
            output_index: None,
            environment: None,
        }
    }
}

/// An ordered, append-only message log with derived interaction records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// Ordered messages
    pub messages: Vec<ChatMessage>,

    /// One record per user turn, in order
    pub interactions: Vec<Interaction>,

    /// Change-notification bus (not persisted)
    #[serde(skip, default)]
    bus: Arc<EventBus>,
}

impl Conversation {
    /// Create a new empty conversation with a private event bus.
    pub fn new() -> Self {
        Self::with_bus(Arc::new(EventBus::default()))
    }

    /// Create a new conversation publishing changes on a shared bus.
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            id: ConversationId::new(),
            created_at: Utc::now(),
            messages: Vec::new(),
            interactions: Vec::new(),
            bus,
        }
    }

    /// The change-notification bus for this conversation.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// The persistence key: `conversation_<datetime>_<uuid>`.
    pub fn storage_key(&self) -> String {
        format!(
            "conversation_{}_{}",
            self.created_at.format("%Y%m%d_%H%M%S"),
            self.id
        )
    }

    /// Append a message, routing by role.
    ///
    /// A user message opens a new interaction and returns its handle. An
    /// assistant message attaches to the current interaction as its output;
    /// with no interaction to attach to it is kept but logged as orphaned.
    /// System messages are appended without interaction bookkeeping.
    pub fn append(&mut self, message: ChatMessage) -> Option<usize> {
        let index = self.messages.len();
        let role = message.role;
        self.messages.push(message);

        self.bus.publish(DialogueEvent::MessageAppended {
            conversation_id: self.id.to_string(),
            role,
            index,
            timestamp: Utc::now(),
        });

        match role {
            Role::User => {
                self.interactions.push(Interaction::new(index));
                let handle = self.interactions.len() - 1;
                self.bus.publish(DialogueEvent::InteractionStarted {
                    conversation_id: self.id.to_string(),
                    interaction: handle,
                    timestamp: Utc::now(),
                });
                Some(handle)
            }
            Role::Assistant => {
                match self.interactions.last_mut() {
                    Some(interaction) => interaction.output_index = Some(index),
                    None => {
                        warn!(
                            conversation_id = %self.id,
                            index,
                            "Assistant message appended with no interaction to attach to"
                        );
                    }
                }
                None
            }
            Role::System => None,
        }
    }

    /// The most recent interaction, if any.
    pub fn current_interaction(&self) -> Option<&Interaction> {
        self.interactions.last()
    }

    /// Mutable access to an interaction by handle.
    pub fn interaction_mut(&mut self, handle: usize) -> Option<&mut Interaction> {
        self.interactions.get_mut(handle)
    }

    /// Read access to an interaction by handle.
    pub fn interaction(&self, handle: usize) -> Option<&Interaction> {
        self.interactions.get(handle)
    }

    /// Move an interaction to a new status, publishing the change.
    ///
    /// Illegal transitions are logged and ignored; the current status is kept.
    pub fn advance_interaction(&mut self, handle: usize, status: InteractionStatus) {
        let id = self.id.to_string();
        let Some(interaction) = self.interactions.get_mut(handle) else {
            warn!(conversation_id = %id, handle, "No such interaction");
            return;
        };

        if !interaction.status.can_transition_to(status) {
            warn!(
                conversation_id = %id,
                handle,
                from = ?interaction.status,
                to = ?status,
                "Ignoring illegal interaction status transition"
            );
            return;
        }

        interaction.status = status;
        let agent_name = interaction.agent_name.clone();
        self.bus.publish(DialogueEvent::InteractionStatusChanged {
            conversation_id: id,
            interaction: handle,
            status,
            agent_name,
            timestamp: Utc::now(),
        });
    }

    /// The text of the last user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content_text())
    }

    /// The assistant answer attached to an interaction, if any.
    pub fn interaction_output(&self, handle: usize) -> Option<&ChatMessage> {
        self.interactions
            .get(handle)
            .and_then(|i| i.output_index)
            .and_then(|idx| self.messages.get(idx))
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interactions_track_user_messages_only() {
        let mut conv = Conversation::new();
        conv.append(ChatMessage::system("You are helpful."));
        conv.append(ChatMessage::user("first"));
        conv.append(ChatMessage::assistant("answer one"));
        conv.append(ChatMessage::user("second"));
        conv.append(ChatMessage::user("third"));
        conv.append(ChatMessage::assistant("answer three"));

        assert_eq!(conv.messages.len(), 6);
        assert_eq!(conv.interactions.len(), 3);
    }

    #[test]
    fn user_append_returns_interaction_handle() {
        let mut conv = Conversation::new();
        assert_eq!(conv.append(ChatMessage::user("a")), Some(0));
        assert_eq!(conv.append(ChatMessage::assistant("b")), None);
        assert_eq!(conv.append(ChatMessage::user("c")), Some(1));
    }

    #[test]
    fn assistant_message_attaches_to_current_interaction() {
        let mut conv = Conversation::new();
        let handle = conv.append(ChatMessage::user("question")).unwrap();
        conv.append(ChatMessage::assistant("answer"));

        let out = conv.interaction_output(handle).unwrap();
        assert_eq!(out.content_text(), "answer");
    }

    #[test]
    fn orphaned_assistant_message_does_not_create_interaction() {
        let mut conv = Conversation::new();
        conv.append(ChatMessage::assistant("floating"));
        assert!(conv.interactions.is_empty());
        assert_eq!(conv.messages.len(), 1);
    }

    #[test]
    fn current_interaction_none_on_empty_conversation() {
        let conv = Conversation::new();
        assert!(conv.current_interaction().is_none());
    }

    #[test]
    fn status_machine_happy_path() {
        let mut conv = Conversation::new();
        let h = conv.append(ChatMessage::user("q")).unwrap();

        conv.advance_interaction(h, InteractionStatus::Planning);
        conv.advance_interaction(h, InteractionStatus::Executing);
        conv.advance_interaction(h, InteractionStatus::Reflecting);
        conv.advance_interaction(h, InteractionStatus::Executing);
        conv.advance_interaction(h, InteractionStatus::Completed);

        assert_eq!(
            conv.interaction(h).unwrap().status,
            InteractionStatus::Completed
        );
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let mut conv = Conversation::new();
        let h = conv.append(ChatMessage::user("q")).unwrap();

        conv.advance_interaction(h, InteractionStatus::Completed);
        // Completed is terminal — a later Planning request is dropped
        conv.advance_interaction(h, InteractionStatus::Planning);

        assert_eq!(
            conv.interaction(h).unwrap().status,
            InteractionStatus::Completed
        );
    }

    #[tokio::test]
    async fn transitions_publish_events() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let mut conv = Conversation::with_bus(bus);

        let h = conv.append(ChatMessage::user("q")).unwrap();
        conv.advance_interaction(h, InteractionStatus::Planning);

        // MessageAppended, InteractionStarted, InteractionStatusChanged
        let mut kinds = Vec::new();
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            kinds.push(match event.as_ref() {
                DialogueEvent::MessageAppended { .. } => "appended",
                DialogueEvent::InteractionStarted { .. } => "started",
                DialogueEvent::InteractionStatusChanged { .. } => "status",
            });
        }
        assert_eq!(kinds, vec!["appended", "started", "status"]);
    }

    #[test]
    fn storage_key_shape() {
        let conv = Conversation::new();
        let key = conv.storage_key();
        assert!(key.starts_with("conversation_"));
        // conversation_YYYYMMDD_HHMMSS_<uuid>
        assert!(key.ends_with(&conv.id.to_string()));
    }

    #[test]
    fn serialization_skips_bus() {
        let mut conv = Conversation::new();
        conv.append(ChatMessage::user("persist me"));
        let json = serde_json::to_string(&conv).unwrap();
        let restored: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.messages.len(), 1);
        assert_eq!(restored.interactions.len(), 1);
    }
}
