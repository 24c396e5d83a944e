//! Error types for the Sidekick domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Sidekick operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Dialogue aborts (the only errors that cross the agent boundary) ---
    #[error("Dialogue error: {0}")]
    Dialogue(#[from] DialogueError),

    // --- Agent dispatch errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Model backend errors ---
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Aborts raised while consuming a model response stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error("Sensitive content detected in model output")]
    SensitiveContent,

    #[error("Response consumption was cancelled")]
    Cancelled,

    #[error("A thought of type '{0}' cannot be read as a message")]
    NotAMessage(&'static str),
}

/// Programmer/configuration errors raised during action dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Unimplemented action: {action} (agent {agent})")]
    UnimplementedAction { agent: String, action: String },

    #[error("Unexpected action in CompositeAgent({agent}): {action}")]
    UnexpectedCompositeAction { agent: String, action: String },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
}

/// Failures inside a `ModelService` implementation.
///
/// These are caught at the service boundary and surfaced as error-typed
/// `Thought`s; they never propagate into the agent layer.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_displays_correctly() {
        let err = Error::Service(ServiceError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn composite_action_error_names_agent_and_action() {
        let err = Error::Agent(AgentError::UnexpectedCompositeAction {
            agent: "side_panel".into(),
            action: "translate".into(),
        });
        assert_eq!(
            err.to_string(),
            "Agent error: Unexpected action in CompositeAgent(side_panel): translate"
        );
    }

    #[test]
    fn dialogue_aborts_are_distinguishable() {
        assert_ne!(DialogueError::SensitiveContent, DialogueError::Cancelled);
    }
}
