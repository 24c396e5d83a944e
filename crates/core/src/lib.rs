//! # Sidekick Core
//!
//! Domain types, traits, and error definitions for the Sidekick dialogue-agent
//! framework. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here: the model backend
//! (`ModelService`), conversation persistence (`ConversationRepository`), and
//! the page-context source (`EnvironmentProvider`). Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod conversation;
pub mod environment;
pub mod error;
pub mod event;
pub mod message;
pub mod repository;
pub mod service;
pub mod thought;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use conversation::{Conversation, ConversationId, Interaction, InteractionStatus};
pub use environment::{Environment, EnvironmentProvider, PageContent, PageSnapshot};
pub use error::{AgentError, DialogueError, Error, Result, ServiceError, StoreError};
pub use event::{DialogueEvent, EventBus};
pub use message::{ChatMessage, ContentPart, MessageContent, Role};
pub use repository::ConversationRepository;
pub use service::{CompletionRequest, ModelService, ResponseFormat, ToolsCallRequest};
pub use thought::{Action, CancelToken, MessageObserver, StreamChunk, Thought, ThoughtStream};
pub use tool::{FunctionDeclaration, Tool};
