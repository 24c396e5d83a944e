//! Dialogue event system — change notification for UI binding.
//!
//! Interaction status transitions and message appends are published as
//! events. UI layers subscribe to refresh their rendering; the absence of a
//! subscriber is not an error.

use crate::conversation::InteractionStatus;
use crate::message::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All dialogue events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DialogueEvent {
    /// A user message opened a new interaction
    InteractionStarted {
        conversation_id: String,
        interaction: usize,
        timestamp: DateTime<Utc>,
    },

    /// An interaction's status changed
    InteractionStatusChanged {
        conversation_id: String,
        interaction: usize,
        status: InteractionStatus,
        agent_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was appended to the conversation
    MessageAppended {
        conversation_id: String,
        role: Role,
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for dialogue events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they
/// care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DialogueEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DialogueEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DialogueEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DialogueEvent::InteractionStatusChanged {
            conversation_id: "c1".into(),
            interaction: 0,
            status: InteractionStatus::Planning,
            agent_name: "chat".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DialogueEvent::InteractionStatusChanged { status, .. } => {
                assert_eq!(*status, InteractionStatus::Planning);
            }
            _ => panic!("Expected InteractionStatusChanged event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DialogueEvent::InteractionStarted {
            conversation_id: "c1".into(),
            interaction: 0,
            timestamp: Utc::now(),
        });
    }
}
