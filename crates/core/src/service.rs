//! ModelService trait — the abstraction over the hosted chat-completion
//! backend.
//!
//! Implementations own all wire details (HTTP, auth, request/response
//! shapes). The core only assumes the two stream chunk shapes of
//! [`crate::thought::StreamChunk`] and the tri-state `Thought` result.
//!
//! Backend failures are caught inside the implementation and encoded as
//! error-typed `Thought`s; they are never allowed to propagate across the
//! agent boundary.

use crate::message::ChatMessage;
use crate::thought::Thought;
use crate::tool::FunctionDeclaration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Requested response body format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A free-form answer request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The conversation messages, system prompt at index 0 by convention
    pub messages: Vec<ChatMessage>,

    /// Whether to stream the response
    pub stream: bool,

    /// Whether multimodal parts may be sent
    pub multimodal: bool,

    /// Requested response format
    pub format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            stream: false,
            multimodal: false,
            format: ResponseFormat::Text,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_multimodal(mut self, enabled: bool) -> Self {
        self.multimodal = enabled;
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }
}

/// A tool-selection request.
#[derive(Debug, Clone)]
pub struct ToolsCallRequest {
    /// The conversation messages, system prompt at index 0 by convention
    pub messages: Vec<ChatMessage>,

    /// The tool catalog offered to the model
    pub tools: Vec<FunctionDeclaration>,

    /// Whether the caller would accept a streamed answer when the model
    /// chooses to answer directly instead of selecting a tool
    pub stream: bool,

    /// Requested response format
    pub format: ResponseFormat,
}

impl ToolsCallRequest {
    pub fn new(messages: Vec<ChatMessage>, tools: Vec<FunctionDeclaration>) -> Self {
        Self {
            messages,
            tools,
            stream: false,
            format: ResponseFormat::Text,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }
}

/// The hosted chat-completion backend.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Free-form answer: a `message` or `stream` thought, or an `error`
    /// thought on backend failure.
    async fn chat_completion(&self, request: CompletionRequest) -> Thought;

    /// Tool selection: an `actions` thought when the model picks tools, a
    /// `message` thought when it answers directly, or an `error` thought on
    /// backend failure.
    async fn tools_call(&self, request: ToolsCallRequest) -> Thought;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_builder() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .streaming()
            .with_multimodal(true)
            .with_format(ResponseFormat::Json);
        assert!(req.stream);
        assert!(req.multimodal);
        assert_eq!(req.format, ResponseFormat::Json);
    }

    #[test]
    fn tools_call_request_defaults() {
        let req = ToolsCallRequest::new(vec![ChatMessage::user("hi")], vec![]);
        assert!(!req.stream);
        assert_eq!(req.format, ResponseFormat::Text);
    }
}
