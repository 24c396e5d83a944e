//! Shared dialogue lifecycle — the base every agent builds on.
//!
//! A `DialogueContext` owns what a turn needs around the model call: the
//! (possibly shared) conversation, the environment provider, an optional
//! repository, the partial-text observer, and the cancellation token.
//!
//! Lifecycle: [`DialogueContext::start_interaction`] always runs before
//! planning; [`DialogueContext::resolve`] turns a `Thought` into plain text;
//! [`DialogueContext::finish`] appends the assistant answer, completes the
//! interaction, and persists the conversation when a repository is present.

use sidekick_core::conversation::{Conversation, InteractionStatus};
use sidekick_core::environment::{Environment, EnvironmentProvider, PageSnapshot};
use sidekick_core::error::{Error, Result};
use sidekick_core::message::ChatMessage;
use sidekick_core::repository::ConversationRepository;
use sidekick_core::thought::{CancelToken, MessageObserver, Thought};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Build a conversation pre-seeded with a system message at index 0, ready
/// for in-place prompt rewriting.
pub fn seeded_conversation(system_prompt: &str) -> Arc<Mutex<Conversation>> {
    let mut conversation = Conversation::new();
    conversation.append(ChatMessage::system(system_prompt));
    Arc::new(Mutex::new(conversation))
}

/// The shared per-agent dialogue state and lifecycle operations.
pub struct DialogueContext {
    conversation: Arc<Mutex<Conversation>>,
    environment: Arc<dyn EnvironmentProvider>,
    repository: Option<Arc<dyn ConversationRepository>>,
    observer: Mutex<Option<MessageObserver>>,
    cancel: CancelToken,
}

impl DialogueContext {
    /// Create a context with a fresh seeded conversation.
    pub fn new(environment: Arc<dyn EnvironmentProvider>, system_prompt: &str) -> Self {
        Self::with_conversation(seeded_conversation(system_prompt), environment)
    }

    /// Create a context over an existing (shared) conversation.
    pub fn with_conversation(
        conversation: Arc<Mutex<Conversation>>,
        environment: Arc<dyn EnvironmentProvider>,
    ) -> Self {
        Self {
            conversation,
            environment,
            repository: None,
            observer: Mutex::new(None),
            cancel: CancelToken::new(),
        }
    }

    /// Attach a repository; the conversation is saved after every finished
    /// turn.
    pub fn with_repository(mut self, repository: Arc<dyn ConversationRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn conversation(&self) -> Arc<Mutex<Conversation>> {
        self.conversation.clone()
    }

    pub fn set_observer(&self, observer: MessageObserver) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Append the user message and take a fresh environment snapshot.
    ///
    /// Returns the new interaction's handle plus the snapshot — `None` when
    /// the page collaborator is unreachable, which callers answer with a
    /// canned reply rather than an error.
    pub async fn start_interaction(
        &self,
        message: ChatMessage,
    ) -> Result<(usize, Option<PageSnapshot>)> {
        let snapshot = self.environment.snapshot().await;

        let handle = {
            let mut conversation = self.conversation.lock().unwrap();
            conversation
                .append(message)
                .ok_or_else(|| Error::Internal("start_interaction requires a user message".into()))?
        };

        Ok((handle, snapshot))
    }

    /// Attach the rendered environment to an interaction.
    pub fn attach_environment(&self, handle: usize, environment: Environment) {
        let mut conversation = self.conversation.lock().unwrap();
        if let Some(interaction) = conversation.interaction_mut(handle) {
            interaction.environment = Some(environment);
        }
    }

    /// The environment attached to an interaction, if any.
    pub fn environment_of(&self, handle: usize) -> Option<Environment> {
        self.conversation
            .lock()
            .unwrap()
            .interaction(handle)
            .and_then(|i| i.environment.clone())
    }

    /// The most recent interaction's handle.
    pub fn current_handle(&self) -> Option<usize> {
        let conversation = self.conversation.lock().unwrap();
        conversation.interactions.len().checked_sub(1)
    }

    /// Move an interaction to a new status (illegal transitions are ignored).
    pub fn advance(&self, handle: usize, status: InteractionStatus) {
        self.conversation
            .lock()
            .unwrap()
            .advance_interaction(handle, status);
    }

    /// Attribute an interaction to an agent.
    pub fn set_agent(&self, handle: usize, agent_name: &str) {
        let mut conversation = self.conversation.lock().unwrap();
        if let Some(interaction) = conversation.interaction_mut(handle) {
            interaction.agent_name = agent_name.to_string();
        }
    }

    /// Record the planned intent of an interaction.
    pub fn set_intent(
        &self,
        handle: usize,
        intent: &str,
        goal: &str,
        arguments: Option<serde_json::Value>,
    ) {
        let mut conversation = self.conversation.lock().unwrap();
        if let Some(interaction) = conversation.interaction_mut(handle) {
            interaction.intent = intent.to_string();
            interaction.goal = goal.to_string();
            interaction.intent_arguments = arguments;
        }
    }

    /// A snapshot of the current message log.
    pub fn messages_snapshot(&self) -> Vec<ChatMessage> {
        self.conversation.lock().unwrap().messages.clone()
    }

    /// The text of the last user message, if any.
    pub fn last_user_text(&self) -> Option<String> {
        self.conversation
            .lock()
            .unwrap()
            .last_user_text()
            .map(str::to_string)
    }

    /// Turn a message or stream thought into plain text.
    ///
    /// Streams are drained chunk by chunk, firing the registered observer
    /// with the accumulated text and honoring the cancellation token. The
    /// sensitive-content abort propagates uncaught.
    pub async fn resolve(&self, thought: Thought) -> Result<String> {
        let observer = self.observer.lock().unwrap().clone();
        thought
            .into_message(observer.as_ref(), Some(&self.cancel))
            .await
            .map_err(Error::from)
    }

    /// Append the assistant answer, complete the interaction, persist.
    ///
    /// Repository failures propagate — persistence is not best-effort here.
    pub async fn finish(&self, handle: usize, text: &str, agent_name: &str) -> Result<()> {
        {
            let mut conversation = self.conversation.lock().unwrap();
            conversation.append(ChatMessage::assistant(text).with_name(agent_name));
            conversation.advance_interaction(handle, InteractionStatus::Completed);
        }

        if let Some(repository) = &self.repository {
            let snapshot = self.conversation.lock().unwrap().clone();
            let key = repository.save(&snapshot).await?;
            debug!(key = %key, "Conversation persisted");
        }

        Ok(())
    }
}
