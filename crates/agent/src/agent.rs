//! The Agent trait — the surface a UI drives.

use async_trait::async_trait;
use sidekick_core::conversation::Conversation;
use sidekick_core::error::Result;
use sidekick_core::message::ChatMessage;
use sidekick_core::thought::{Action, CancelToken, MessageObserver};
use sidekick_core::tool::Tool;
use std::sync::{Arc, Mutex};

/// A policy object that turns a conversation turn into an answer, possibly
/// via tools.
///
/// Only the dialogue aborts (sensitive content, cancellation) and fatal
/// dispatch misconfigurations surface as `Err`; everything else — backend
/// failures included — arrives as a visible answer string.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Routing name of this agent (matched by `@mention`).
    fn name(&self) -> &str;

    /// What this agent is for (shown in agent listings).
    fn description(&self) -> &str;

    /// The agent's tool catalog.
    fn tools(&self) -> Vec<Tool>;

    /// The conversation this agent appends to.
    fn conversation(&self) -> Arc<Mutex<Conversation>>;

    /// Register the live partial-text listener.
    fn set_message_observer(&self, observer: MessageObserver);

    /// The token that stops stream consumption for the current turn.
    fn cancel_token(&self) -> CancelToken;

    /// Handle one free-text user turn: plan, execute, answer.
    async fn chat(&self, text: &str) -> Result<String>;

    /// Execute a pre-built action plan for a user turn, skipping planning.
    /// An empty plan falls back to plain chat.
    async fn execute_command(&self, actions: Vec<Action>, message: ChatMessage) -> Result<String>;
}
