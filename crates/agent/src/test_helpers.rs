//! Shared test helpers for agent tests.

use crate::agent::Agent;
use async_trait::async_trait;
use sidekick_core::conversation::Conversation;
use sidekick_core::error::Result;
use sidekick_core::message::ChatMessage;
use sidekick_core::service::{CompletionRequest, ModelService, ToolsCallRequest};
use sidekick_core::thought::{
    Action, CancelToken, MessageObserver, StreamChunk, Thought, ThoughtStream,
};
use sidekick_core::tool::Tool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A scripted model backend that returns a queue of thoughts in order.
///
/// `chat_completion` and `tools_call` pop from the same queue — agents issue
/// backend calls in a deterministic order. Panics when the queue runs dry.
pub struct ScriptedService {
    thoughts: Mutex<VecDeque<Thought>>,
    completion_requests: Mutex<Vec<CompletionRequest>>,
    tools_requests: Mutex<Vec<ToolsCallRequest>>,
}

impl ScriptedService {
    pub fn new(thoughts: Vec<Thought>) -> Self {
        Self {
            thoughts: Mutex::new(thoughts.into()),
            completion_requests: Mutex::new(Vec::new()),
            tools_requests: Mutex::new(Vec::new()),
        }
    }

    fn next_thought(&self) -> Thought {
        self.thoughts
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedService: no more scripted thoughts")
    }

    /// Completion requests seen so far.
    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.completion_requests.lock().unwrap().clone()
    }

    /// Tool-selection requests seen so far.
    pub fn tools_requests(&self) -> Vec<ToolsCallRequest> {
        self.tools_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat_completion(&self, request: CompletionRequest) -> Thought {
        self.completion_requests.lock().unwrap().push(request);
        self.next_thought()
    }

    async fn tools_call(&self, request: ToolsCallRequest) -> Thought {
        self.tools_requests.lock().unwrap().push(request);
        self.next_thought()
    }
}

/// A stream thought made of plain text deltas.
pub fn stream_thought(parts: &[&str]) -> Thought {
    Thought::Stream(ThoughtStream::from_chunks(
        parts.iter().map(|p| StreamChunk::delta(*p)).collect(),
    ))
}

/// A stream thought that aborts with a sensitive-content finish after the
/// given prefix.
pub fn sensitive_stream_thought(prefix: &str) -> Thought {
    Thought::Stream(ThoughtStream::from_chunks(vec![
        StreamChunk::delta(prefix),
        StreamChunk::finish(None, "sensitive"),
    ]))
}

/// A recording agent for router tests: remembers every call it receives and
/// answers with a fixed string.
pub struct RecordingAgent {
    name: String,
    tools: Vec<Tool>,
    reply: String,
    conversation: Arc<Mutex<Conversation>>,
    pub chats: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<(Vec<Action>, String)>>,
}

impl RecordingAgent {
    pub fn new(name: impl Into<String>, tools: Vec<Tool>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools,
            reply: reply.into(),
            conversation: Arc::new(Mutex::new(Conversation::new())),
            chats: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Agent for RecordingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "recording stub"
    }

    fn tools(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    fn conversation(&self) -> Arc<Mutex<Conversation>> {
        self.conversation.clone()
    }

    fn set_message_observer(&self, _observer: MessageObserver) {}

    fn cancel_token(&self) -> CancelToken {
        CancelToken::new()
    }

    async fn chat(&self, text: &str) -> Result<String> {
        self.chats.lock().unwrap().push(text.to_string());
        Ok(self.reply.clone())
    }

    async fn execute_command(&self, actions: Vec<Action>, message: ChatMessage) -> Result<String> {
        self.commands
            .lock()
            .unwrap()
            .push((actions, message.content_text().to_string()));
        Ok(self.reply.clone())
    }
}
