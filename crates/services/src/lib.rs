//! Model backend implementations for Sidekick.
//!
//! The agent layer talks to a [`sidekick_core::ModelService`]; this crate
//! provides the implementations. Backend failures never cross the agent
//! boundary as errors — they are encoded as error-typed `Thought`s here.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatService;
