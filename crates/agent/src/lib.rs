//! The Sidekick agent framework — the heart of the system.
//!
//! An agent turns one conversation turn into an answer via a
//! **Plan → Execute → (Reflect)** cycle:
//!
//! 1. **Start** the interaction: append the user message, snapshot the page
//!    environment, attach it to the turn
//! 2. **Plan**: offer the agent's tool catalog to the model for selection
//! 3. **Execute** the chosen action — free chat, a canned reply, or a
//!    registered tool handler
//! 4. **Reflect** (optional): critique the answer and possibly revise it
//! 5. **Finish**: append the assistant answer, persist the conversation
//!
//! Routing layers compose agents: [`CompositeAgent`] merges several agents'
//! tool catalogs behind one front, and [`DelegateAgent`] dispatches raw user
//! text by `/command` and `@agent` prefixes.

pub mod agent;
pub mod composite;
pub mod delegate;
pub mod dialogue;
pub mod reflection;
pub mod thought_agent;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::Agent;
pub use composite::CompositeAgent;
pub use delegate::DelegateAgent;
pub use dialogue::DialogueContext;
pub use reflection::{ReflectionOutcome, ReflectionService};
pub use thought_agent::{ActionRouter, ThoughtAgent, ToolHandler, handler_fn, rewrite_messages};
