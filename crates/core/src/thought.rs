//! Thoughts — the result of asking the model something.
//!
//! A `Thought` is either a ready message, an async stream of text chunks, a
//! list of proposed tool actions, or an error. Exactly one payload is
//! meaningful per variant.
//!
//! Stream consumption recognizes two chunk shapes: the OpenAI-style
//! `{choices:[{delta:{content},finish_reason}]}` delta and the generic
//! `{data}` shape. Chunks are concatenated in arrival order; an observer
//! callback fires after every chunk so a UI can render partial text. A
//! `finish_reason` of `"sensitive"` aborts the drain with a hard error that
//! callers must let propagate.

use crate::error::DialogueError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Argument key carrying the raw user input of a synthesized or routed action.
pub const USER_INPUT_ARG: &str = "userInput";

/// A single requested tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Tool name to invoke
    pub name: String,

    /// Arguments object
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl Action {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// The synthetic free-chat action carrying the user's raw input.
    pub fn chat(user_input: impl Into<String>) -> Self {
        Self::new(
            "chat",
            serde_json::json!({ USER_INPUT_ARG: user_input.into() }),
        )
    }

    /// A canned-reply action carrying ready message text.
    pub fn reply_text(text: impl Into<String>) -> Self {
        Self::new("reply", serde_json::json!({ "text": text.into() }))
    }

    /// A canned-reply action carrying an error to surface.
    pub fn reply_error(message: impl Into<String>) -> Self {
        Self::new("reply", serde_json::json!({ "error": message.into() }))
    }

    /// A string-typed argument by key.
    pub fn string_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// The `userInput` argument, when present.
    pub fn user_input(&self) -> Option<&str> {
        self.string_arg(USER_INPUT_ARG)
    }
}

/// One unit of a streamed model response.
///
/// Untagged: a chunk is whichever shape it parses as. Anything else is
/// treated by producers as an empty delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamChunk {
    /// OpenAI-style completion delta
    Completion { choices: Vec<ChunkChoice> },

    /// Generic text payload
    Plain { data: String },
}

impl StreamChunk {
    /// A chunk contributing no text.
    pub fn empty() -> Self {
        StreamChunk::Completion { choices: vec![] }
    }

    /// A plain content delta.
    pub fn delta(text: impl Into<String>) -> Self {
        StreamChunk::Completion {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(text.into()),
                },
                finish_reason: None,
            }],
        }
    }

    /// A final chunk carrying a finish reason.
    pub fn finish(text: Option<&str>, reason: &str) -> Self {
        StreamChunk::Completion {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: text.map(str::to_string),
                },
                finish_reason: Some(reason.to_string()),
            }],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Observer invoked with the accumulated text after every chunk.
pub type MessageObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Cooperative cancellation for stream draining.
///
/// Once a request is issued it runs to completion on the backend; the token
/// only stops local consumption.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An async sequence of [`StreamChunk`]s from the model backend.
#[derive(Debug)]
pub struct ThoughtStream {
    rx: mpsc::Receiver<StreamChunk>,
}

impl ThoughtStream {
    pub fn new(rx: mpsc::Receiver<StreamChunk>) -> Self {
        Self { rx }
    }

    /// Build a stream from pre-baked chunks (tests, canned replies).
    pub fn from_chunks(chunks: Vec<StreamChunk>) -> Self {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // Capacity matches, so try_send cannot fail here
            let _ = tx.try_send(chunk);
        }
        Self { rx }
    }

    /// Drain the stream into a single string.
    ///
    /// Text deltas are concatenated in arrival order; `observer` fires with
    /// the accumulated text after every chunk. A `finish_reason` of
    /// `"sensitive"` aborts with [`DialogueError::SensitiveContent`]; a
    /// tripped `cancel` token aborts with [`DialogueError::Cancelled`].
    pub async fn drain(
        mut self,
        observer: Option<&MessageObserver>,
        cancel: Option<&CancelToken>,
    ) -> Result<String, DialogueError> {
        let mut accumulated = String::new();

        while let Some(chunk) = self.rx.recv().await {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(DialogueError::Cancelled);
            }

            match chunk {
                StreamChunk::Completion { choices } => {
                    if let Some(choice) = choices.first() {
                        if choice.finish_reason.as_deref() == Some("sensitive") {
                            return Err(DialogueError::SensitiveContent);
                        }
                        if let Some(text) = &choice.delta.content {
                            accumulated.push_str(text);
                        }
                    }
                }
                StreamChunk::Plain { data } => accumulated.push_str(&data),
            }

            if let Some(observer) = observer {
                observer(&accumulated);
            }
        }

        Ok(accumulated)
    }
}

/// The tri-state result of asking the model something.
#[derive(Debug)]
pub enum Thought {
    /// Proposed tool actions
    Actions(Vec<Action>),

    /// A ready message
    Message(String),

    /// A stream of text chunks
    Stream(ThoughtStream),

    /// A recoverable failure, rendered to the user as-is
    Error(String),
}

impl Thought {
    /// Variant name, for logs and usage errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Thought::Actions(_) => "actions",
            Thought::Message(_) => "message",
            Thought::Stream(_) => "stream",
            Thought::Error(_) => "error",
        }
    }

    /// Read this thought as message text, draining a stream if needed.
    ///
    /// Calling this on an `actions` or `error` thought is a usage error.
    pub async fn into_message(
        self,
        observer: Option<&MessageObserver>,
        cancel: Option<&CancelToken>,
    ) -> Result<String, DialogueError> {
        match self {
            Thought::Message(text) => Ok(text),
            Thought::Stream(stream) => stream.drain(observer, cancel).await,
            other => Err(DialogueError::NotAMessage(other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn drain_concatenates_deltas_in_order() {
        let stream = ThoughtStream::from_chunks(vec![
            StreamChunk::delta("ab"),
            StreamChunk::finish(Some("cd"), "stop"),
        ]);
        let text = stream.drain(None, None).await.unwrap();
        assert_eq!(text, "abcd");
    }

    #[tokio::test]
    async fn drain_handles_generic_data_chunks() {
        let stream = ThoughtStream::from_chunks(vec![
            StreamChunk::Plain { data: "he".into() },
            StreamChunk::Plain { data: "llo".into() },
        ]);
        assert_eq!(stream.drain(None, None).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn sensitive_finish_reason_aborts() {
        let stream = ThoughtStream::from_chunks(vec![
            StreamChunk::delta("partial"),
            StreamChunk::finish(None, "sensitive"),
        ]);
        let err = stream.drain(None, None).await.unwrap_err();
        assert_eq!(err, DialogueError::SensitiveContent);
    }

    #[tokio::test]
    async fn observer_sees_accumulated_text() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let observer: MessageObserver = Arc::new(move |text: &str| {
            seen_clone.lock().unwrap().push(text.to_string());
        });

        let stream =
            ThoughtStream::from_chunks(vec![StreamChunk::delta("a"), StreamChunk::delta("b")]);
        let text = stream.drain(Some(&observer), None).await.unwrap();

        assert_eq!(text, "ab");
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "ab".into()]);
    }

    #[tokio::test]
    async fn cancel_token_aborts_drain() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let stream = ThoughtStream::from_chunks(vec![StreamChunk::delta("never seen")]);
        let err = stream.drain(None, Some(&cancel)).await.unwrap_err();
        assert_eq!(err, DialogueError::Cancelled);
    }

    #[tokio::test]
    async fn malformed_chunk_contributes_nothing() {
        let stream = ThoughtStream::from_chunks(vec![
            StreamChunk::empty(),
            StreamChunk::delta("ok"),
            StreamChunk::empty(),
        ]);
        assert_eq!(stream.drain(None, None).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn into_message_on_actions_is_usage_error() {
        let thought = Thought::Actions(vec![Action::chat("hi")]);
        let err = thought.into_message(None, None).await.unwrap_err();
        assert_eq!(err, DialogueError::NotAMessage("actions"));
    }

    #[tokio::test]
    async fn into_message_passes_ready_text_through() {
        let thought = Thought::Message("done".into());
        assert_eq!(thought.into_message(None, None).await.unwrap(), "done");
    }

    #[test]
    fn chunk_shapes_deserialize() {
        let openai: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        match openai {
            StreamChunk::Completion { choices } => {
                assert_eq!(choices[0].delta.content.as_deref(), Some("hi"));
            }
            _ => panic!("Expected completion shape"),
        }

        let generic: StreamChunk = serde_json::from_str(r#"{"data":"hi"}"#).unwrap();
        assert_eq!(
            generic,
            StreamChunk::Plain { data: "hi".into() },
        );
    }

    #[test]
    fn synthetic_chat_action_carries_user_input() {
        let action = Action::chat("what is this page about?");
        assert_eq!(action.name, "chat");
        assert_eq!(action.user_input(), Some("what is this page about?"));
    }
}
