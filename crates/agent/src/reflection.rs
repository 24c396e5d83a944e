//! The reflection service — the finished/suggest/revise critique protocol.
//!
//! This is the second of the two self-critique variants: a scoring pass
//! classifies the answer as `finished` or `suggest` (with a suggestion), a
//! revision pass rewrites the answer against the suggestion, and the result
//! is scored again, up to a revision cap. The inline good/bad variant lives
//! in the agent itself; the two protocols serve different call sites and are
//! deliberately not merged.

use crate::dialogue::DialogueContext;
use serde::Deserialize;
use sidekick_core::conversation::InteractionStatus;
use sidekick_core::error::Result;
use sidekick_core::message::ChatMessage;
use sidekick_core::service::{CompletionRequest, ModelService, ResponseFormat};
use sidekick_core::thought::Thought;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one scoring pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionOutcome {
    /// The answer serves the request; keep it.
    Finished,
    /// The answer should be revised along the given suggestion.
    Suggest(String),
}

#[derive(Debug, Deserialize)]
struct ReviewVerdict {
    status: String,

    #[serde(default)]
    suggestion: Option<String>,
}

/// Scores an interaction's output and drives revisions.
pub struct ReflectionService {
    service: Arc<dyn ModelService>,
    max_revisions: usize,
}

impl ReflectionService {
    pub fn new(service: Arc<dyn ModelService>, max_revisions: usize) -> Self {
        Self {
            service,
            max_revisions,
        }
    }

    /// Score an answer against its goal.
    ///
    /// Any failure — backend error, missing message, unparseable JSON — is
    /// recoverable and dissolves to `Finished` (the critique pass is simply
    /// skipped).
    pub async fn review(&self, goal: &str, answer: &str) -> ReflectionOutcome {
        let prompt = "You review an assistant's answer to a user request.\n\
             Respond with JSON only: {\"status\": \"finished\"} when the answer \
             serves the request, or {\"status\": \"suggest\", \"suggestion\": \"<what to improve>\"} \
             when it should be revised.";
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user(format!("Request:\n{goal}\n\nAnswer:\n{answer}")),
        ];

        let request = CompletionRequest::new(messages).with_format(ResponseFormat::Json);
        let raw = match self.service.chat_completion(request).await {
            Thought::Message(text) => text,
            Thought::Error(error) => {
                warn!(%error, "Reflection review failed; keeping answer");
                return ReflectionOutcome::Finished;
            }
            other => {
                warn!(kind = other.kind(), "Reflection review returned no message");
                return ReflectionOutcome::Finished;
            }
        };

        let verdict: ReviewVerdict = match serde_json::from_str(&raw) {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(%raw, "Invalid JSON format; reflection skipped");
                return ReflectionOutcome::Finished;
            }
        };

        match (verdict.status.as_str(), verdict.suggestion) {
            ("suggest", Some(suggestion)) => ReflectionOutcome::Suggest(suggestion),
            ("suggest", None) => {
                warn!("Suggest verdict without a suggestion; keeping answer");
                ReflectionOutcome::Finished
            }
            _ => ReflectionOutcome::Finished,
        }
    }

    /// Rewrite an answer along a suggestion. `None` when the revision call
    /// produced nothing usable.
    pub async fn revise(&self, goal: &str, answer: &str, suggestion: &str) -> Option<String> {
        let prompt = "You revise an assistant's answer. Apply the suggestion and \
             respond with the corrected answer only.";
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user(format!(
                "Request:\n{goal}\n\nAnswer:\n{answer}\n\nSuggestion:\n{suggestion}"
            )),
        ];

        match self
            .service
            .chat_completion(CompletionRequest::new(messages))
            .await
        {
            Thought::Message(revised) if !revised.is_empty() => Some(revised),
            Thought::Error(error) => {
                warn!(%error, "Revision call failed; keeping answer");
                None
            }
            other => {
                warn!(kind = other.kind(), "Revision returned no message");
                None
            }
        }
    }

    /// Run the full score → revise → score loop over an interaction's
    /// answer, driving the `Reflecting ⇄ Executing` status transitions.
    pub async fn run(
        &self,
        context: &DialogueContext,
        handle: usize,
        goal: &str,
        mut answer: String,
    ) -> Result<String> {
        for pass in 0..self.max_revisions.max(1) {
            context.advance(handle, InteractionStatus::Reflecting);

            match self.review(goal, &answer).await {
                ReflectionOutcome::Finished => return Ok(answer),
                ReflectionOutcome::Suggest(suggestion) => {
                    debug!(pass, %suggestion, "Revision requested");
                    context.advance(handle, InteractionStatus::Executing);
                    match self.revise(goal, &answer, &suggestion).await {
                        Some(revised) => answer = revised,
                        None => return Ok(answer),
                    }
                }
            }
        }

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedService;
    use sidekick_core::environment::{PageSnapshot, StaticProvider};

    fn context() -> DialogueContext {
        DialogueContext::new(
            Arc::new(StaticProvider::new(PageSnapshot::default())),
            "sys",
        )
    }

    #[tokio::test]
    async fn finished_keeps_answer() {
        let service = Arc::new(ScriptedService::new(vec![Thought::Message(
            r#"{"status": "finished"}"#.into(),
        )]));
        let reflector = ReflectionService::new(service, 2);

        let outcome = reflector.review("goal", "answer").await;
        assert_eq!(outcome, ReflectionOutcome::Finished);
    }

    #[tokio::test]
    async fn suggest_carries_suggestion() {
        let service = Arc::new(ScriptedService::new(vec![Thought::Message(
            r#"{"status": "suggest", "suggestion": "cite the page"}"#.into(),
        )]));
        let reflector = ReflectionService::new(service, 2);

        let outcome = reflector.review("goal", "answer").await;
        assert_eq!(outcome, ReflectionOutcome::Suggest("cite the page".into()));
    }

    #[tokio::test]
    async fn invalid_json_dissolves_to_finished() {
        let service = Arc::new(ScriptedService::new(vec![Thought::Message(
            "no json here".into(),
        )]));
        let reflector = ReflectionService::new(service, 2);

        assert_eq!(
            reflector.review("goal", "answer").await,
            ReflectionOutcome::Finished
        );
    }

    #[tokio::test]
    async fn run_revises_until_finished() {
        let ctx = context();
        let (handle, _) = ctx
            .start_interaction(ChatMessage::user("question"))
            .await
            .unwrap();
        ctx.advance(handle, InteractionStatus::Planning);
        ctx.advance(handle, InteractionStatus::Executing);

        let service = Arc::new(ScriptedService::new(vec![
            Thought::Message(r#"{"status": "suggest", "suggestion": "be specific"}"#.into()),
            Thought::Message("a better answer".into()),
            Thought::Message(r#"{"status": "finished"}"#.into()),
        ]));
        let reflector = ReflectionService::new(service, 3);

        let answer = reflector
            .run(&ctx, handle, "question", "vague answer".into())
            .await
            .unwrap();
        assert_eq!(answer, "a better answer");
    }

    #[tokio::test]
    async fn run_stops_at_revision_cap() {
        let ctx = context();
        let (handle, _) = ctx
            .start_interaction(ChatMessage::user("question"))
            .await
            .unwrap();
        ctx.advance(handle, InteractionStatus::Planning);
        ctx.advance(handle, InteractionStatus::Executing);

        // Always suggests — the cap must stop the loop after two passes
        let service = Arc::new(ScriptedService::new(vec![
            Thought::Message(r#"{"status": "suggest", "suggestion": "more"}"#.into()),
            Thought::Message("revision one".into()),
            Thought::Message(r#"{"status": "suggest", "suggestion": "more"}"#.into()),
            Thought::Message("revision two".into()),
        ]));
        let reflector = ReflectionService::new(service, 2);

        let answer = reflector
            .run(&ctx, handle, "question", "first".into())
            .await
            .unwrap();
        assert_eq!(answer, "revision two");
    }

    #[tokio::test]
    async fn failed_revision_keeps_answer() {
        let ctx = context();
        let (handle, _) = ctx
            .start_interaction(ChatMessage::user("question"))
            .await
            .unwrap();
        ctx.advance(handle, InteractionStatus::Planning);
        ctx.advance(handle, InteractionStatus::Executing);

        let service = Arc::new(ScriptedService::new(vec![
            Thought::Message(r#"{"status": "suggest", "suggestion": "more"}"#.into()),
            Thought::Error("backend down".into()),
        ]));
        let reflector = ReflectionService::new(service, 2);

        let answer = reflector
            .run(&ctx, handle, "question", "original".into())
            .await
            .unwrap();
        assert_eq!(answer, "original");
    }
}
