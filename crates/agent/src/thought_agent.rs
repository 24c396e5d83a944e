//! ThoughtAgent — the concrete plan/execute agent.
//!
//! A `ThoughtAgent` carries a tool catalog and a registry of same-named
//! handlers. One turn runs: start the interaction, offer the catalog to the
//! model for selection (`plan`), normalize the chosen actions
//! (`track_dialogue_state`), and dispatch the first action (`execute`) — to
//! the free-chat completion, a canned reply, a registered handler, or an
//! action router installed by a composing agent.
//!
//! Dispatch is an explicit name → handler registry built at construction;
//! there is no reflective method lookup.

use crate::agent::Agent;
use crate::dialogue::DialogueContext;
use crate::reflection::ReflectionService;
use async_trait::async_trait;
use serde::Deserialize;
use sidekick_config::{AssistantConfig, ReflectionMode};
use sidekick_core::conversation::{Conversation, InteractionStatus};
use sidekick_core::environment::{Environment, EnvironmentProvider, PageSnapshot};
use sidekick_core::error::{AgentError, Error, Result};
use sidekick_core::message::{ChatMessage, ContentPart, MessageContent, Role};
use sidekick_core::service::{CompletionRequest, ModelService, ResponseFormat, ToolsCallRequest};
use sidekick_core::thought::{
    Action, CancelToken, MessageObserver, Thought, USER_INPUT_ARG,
};
use sidekick_core::tool::Tool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Canned reply for an unreachable page collaborator.
const PAGE_UNAVAILABLE_REPLY: &str =
    "I couldn't read the current page. Please refresh the page and try again.";

/// A registered capability: handles the action carrying its tool's name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, action: &Action, messages: &[ChatMessage]) -> Result<Thought>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Action, Vec<ChatMessage>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Thought>> + Send,
{
    async fn handle(&self, action: &Action, messages: &[ChatMessage]) -> Result<Thought> {
        (self.f)(action.clone(), messages.to_vec()).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Action, Vec<ChatMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Thought>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Fallback dispatch for actions outside an agent's own registry.
/// Installed by composing agents to forward actions to their owners.
#[async_trait]
pub trait ActionRouter: Send + Sync {
    async fn route(&self, agent_name: &str, action: Action) -> Result<Thought>;
}

/// Rewrite a message list in place for a completion call.
///
/// Index 0 is rewritten to `system_prompt` only when it already is a system
/// message; the last message's content is rewritten to `replace_user_input`
/// only when it is a user message. The list is never resized — callers rely
/// on indices 0 and `len - 1` staying stable.
pub fn rewrite_messages(
    messages: &mut [ChatMessage],
    system_prompt: Option<&str>,
    replace_user_input: Option<&str>,
) {
    if let Some(prompt) = system_prompt
        && let Some(first) = messages.first_mut()
        && first.role == Role::System
    {
        first.content = MessageContent::Text(prompt.to_string());
    }

    if let Some(user_input) = replace_user_input
        && let Some(last) = messages.last_mut()
        && last.role == Role::User
    {
        last.content = MessageContent::Text(user_input.to_string());
    }
}

#[derive(Debug, Deserialize)]
struct InlineVerdict {
    evaluation: String,

    #[serde(default)]
    revision: Option<String>,
}

/// A started turn: the interaction handle plus its environment, when the
/// page was reachable.
struct StartedTurn {
    handle: usize,
    environment: Option<Environment>,
}

/// The concrete tool-planning agent.
pub struct ThoughtAgent {
    name: String,
    description: String,
    instructions: String,
    config: AssistantConfig,
    service: Arc<dyn ModelService>,
    tools: Vec<Tool>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    router: Option<Arc<dyn ActionRouter>>,
    context: DialogueContext,
}

impl ThoughtAgent {
    /// Create an agent with a fresh conversation.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        service: Arc<dyn ModelService>,
        environment: Arc<dyn EnvironmentProvider>,
        config: AssistantConfig,
    ) -> Self {
        let instructions = "You are a helpful assistant.".to_string();
        let context = DialogueContext::new(environment, &instructions);
        Self {
            name: name.into(),
            description: description.into(),
            instructions,
            config,
            service,
            tools: Vec::new(),
            handlers: HashMap::new(),
            router: None,
            context,
        }
    }

    /// Replace the persona instructions used to render system prompts.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Share an existing conversation (used when several agents answer into
    /// one session).
    pub fn with_conversation(
        mut self,
        conversation: Arc<Mutex<Conversation>>,
        environment: Arc<dyn EnvironmentProvider>,
    ) -> Self {
        self.context = DialogueContext::with_conversation(conversation, environment);
        self
    }

    /// Persist the conversation after every finished turn.
    pub fn with_repository(
        mut self,
        repository: Arc<dyn sidekick_core::repository::ConversationRepository>,
    ) -> Self {
        self.context = self.context.with_repository(repository);
        self
    }

    /// Register a tool together with its handler.
    pub fn add_tool(mut self, tool: Tool, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(tool.name.clone(), handler);
        self.tools.push(tool);
        self
    }

    /// Add a tool to the catalog without a local handler (dispatch goes to
    /// the action router). Used by composing agents.
    pub(crate) fn push_tool(&mut self, tool: Tool) {
        self.tools.push(tool);
    }

    /// Install the fallback action router.
    pub(crate) fn set_router(&mut self, router: Arc<dyn ActionRouter>) {
        self.router = Some(router);
    }

    pub(crate) fn context(&self) -> &DialogueContext {
        &self.context
    }

    /// Whether this agent's catalog carries a tool with the given name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Render the system prompt for a page snapshot: persona, page context,
    /// answer-language hint.
    pub fn system_prompt(&self, snapshot: &PageSnapshot) -> String {
        let mut prompt = self.instructions.clone();

        if let Some(content) = &snapshot.content {
            prompt.push_str("\n\n## Current page\n");
            if !content.title.is_empty() {
                prompt.push_str(&format!("Title: {}\n", content.title));
            }
            if let Some(url) = &content.url {
                prompt.push_str(&format!("URL: {url}\n"));
            }
            if !content.text.is_empty() {
                prompt.push_str(&format!("\n{}\n", content.text));
            }
        }

        if !self.config.language.is_empty() {
            prompt.push_str(&format!("\nAnswer in {}.", self.config.language));
        }

        prompt
    }

    /// Append the user message, snapshot the environment, and attach it.
    async fn start(&self, message: ChatMessage) -> Result<StartedTurn> {
        let (handle, snapshot) = self.context.start_interaction(message).await?;

        let environment = snapshot.map(|snapshot| {
            let environment = Environment::new(self.system_prompt(&snapshot), snapshot);
            self.context.attach_environment(handle, environment.clone());
            environment
        });

        Ok(StartedTurn {
            handle,
            environment,
        })
    }

    /// Answer with the canned unreachable-page reply.
    async fn canned_reply(&self, handle: usize) -> Result<String> {
        let text = self
            .context
            .resolve(Thought::Message(PAGE_UNAVAILABLE_REPLY.into()))
            .await?;
        self.context.finish(handle, &text, &self.name).await?;
        Ok(text)
    }

    /// Offer the tool catalog to the model for selection.
    ///
    /// An agent with no tools plans trivially to an empty action list, which
    /// falls through to plain chat.
    pub async fn plan(&self, environment: &Environment) -> Thought {
        if self.tools.is_empty() {
            return Thought::Actions(Vec::new());
        }

        let mut messages = self.context.messages_snapshot();
        rewrite_messages(&mut messages, Some(&environment.system_prompt), None);

        let request = ToolsCallRequest::new(
            messages,
            self.tools.iter().map(Tool::function).collect(),
        )
        .streaming();

        self.service.tools_call(request).await
    }

    /// Normalize a plan and record it on the interaction.
    ///
    /// No actions → a synthetic `chat` action carrying the last user message
    /// verbatim, so `execute` always has something to run. Otherwise the
    /// first action's name and arguments become the interaction's intent and
    /// goal; later actions are accepted but never executed.
    pub fn track_dialogue_state(&self, handle: usize, mut actions: Vec<Action>) -> Vec<Action> {
        if actions.is_empty() {
            let user_input = self.context.last_user_text().unwrap_or_default();
            let action = Action::chat(user_input.clone());
            self.context
                .set_intent(handle, "chat", &user_input, Some(action.arguments.clone()));
            return vec![action];
        }

        if actions.len() > 1 {
            debug!(
                count = actions.len(),
                "Multi-action plan accepted; only the first action will run"
            );
        }

        // Inject the raw user input where a tool declares it as an implicit
        // argument and the model omitted it
        for action in &mut actions {
            if let Some(tool) = self.tools.iter().find(|t| t.name == action.name)
                && tool.user_input_as_argument
                && action.user_input().is_none()
            {
                let user_input = self.context.last_user_text().unwrap_or_default();
                match &mut action.arguments {
                    serde_json::Value::Object(map) => {
                        map.insert(USER_INPUT_ARG.into(), serde_json::json!(user_input));
                    }
                    other => *other = serde_json::json!({ USER_INPUT_ARG: user_input }),
                }
            }
        }

        let first = &actions[0];
        let goal = first
            .user_input()
            .map(str::to_string)
            .unwrap_or_else(|| first.arguments.to_string());
        self.context
            .set_intent(handle, &first.name, &goal, Some(first.arguments.clone()));

        actions
    }

    /// Run the first planned action.
    pub async fn execute(
        &self,
        handle: usize,
        environment: &Environment,
        actions: Vec<Action>,
    ) -> Result<Thought> {
        self.context.advance(handle, InteractionStatus::Executing);
        self.context.set_agent(handle, &self.name);

        let Some(action) = actions.into_iter().next() else {
            return Ok(Thought::Error("Nothing to execute".into()));
        };

        self.dispatch(environment, action).await
    }

    /// Dispatch one action without status bookkeeping. Shared by [`execute`]
    /// and composite routing.
    pub(crate) async fn dispatch(
        &self,
        environment: &Environment,
        action: Action,
    ) -> Result<Thought> {
        debug!(agent = %self.name, action = %action.name, "Dispatching action");

        match action.name.as_str() {
            "chat" => {
                let messages = self.context.messages_snapshot();
                let user_input = action.user_input().map(str::to_string);
                Ok(self
                    .chat_completion(
                        messages,
                        Some(&environment.system_prompt),
                        user_input.as_deref(),
                        true,
                        ResponseFormat::Text,
                        environment.screenshot.as_deref(),
                    )
                    .await)
            }
            "reply" => Ok(reply_thought(&action)),
            name if self.handlers.contains_key(name) => {
                let handler = self.handlers[name].clone();
                let messages = self.context.messages_snapshot();
                handler.handle(&action, &messages).await
            }
            _ => self.execute_action(action).await,
        }
    }

    /// Fallback for actions outside the registry. Without a router this is a
    /// fatal configuration error.
    async fn execute_action(&self, action: Action) -> Result<Thought> {
        match &self.router {
            Some(router) => router.route(&self.name, action).await,
            None => Err(AgentError::UnimplementedAction {
                agent: self.name.clone(),
                action: action.name,
            }
            .into()),
        }
    }

    /// Run an action routed in by a composing agent: attribute the current
    /// interaction to this agent and dispatch against its environment.
    pub(crate) async fn execute_routed(&self, action: Action) -> Result<Thought> {
        let handle = self
            .context
            .current_handle()
            .ok_or_else(|| Error::Internal("No active interaction to route into".into()))?;
        self.context.set_agent(handle, &self.name);
        let environment = self.context.environment_of(handle).unwrap_or_default();
        self.dispatch(&environment, action).await
    }

    /// Issue a free-form completion over a rewritten message list.
    ///
    /// `system_prompt` replaces index 0's content when index 0 is a system
    /// message; `replace_user_input` replaces the last message's content when
    /// it is a user message. The list is never resized. With multimodal
    /// enabled and a screenshot at hand, the final user turn is sent as
    /// text + image parts.
    pub async fn chat_completion(
        &self,
        mut messages: Vec<ChatMessage>,
        system_prompt: Option<&str>,
        replace_user_input: Option<&str>,
        stream: bool,
        format: ResponseFormat,
        screenshot: Option<&str>,
    ) -> Thought {
        rewrite_messages(&mut messages, system_prompt, replace_user_input);

        if self.config.use_multimodal
            && let Some(screenshot) = screenshot
            && let Some(last) = messages.last_mut()
            && last.role == Role::User
        {
            last.content = MessageContent::Parts(vec![
                ContentPart::Text {
                    text: last.content_text().to_string(),
                },
                ContentPart::Image {
                    url: screenshot.to_string(),
                },
            ]);
        }

        let mut request = CompletionRequest::new(messages)
            .with_multimodal(self.config.use_multimodal)
            .with_format(format);
        if stream {
            request = request.streaming();
        }

        self.service.chat_completion(request).await
    }

    /// Turn an executed thought into the final answer: resolve, reflect,
    /// finish.
    async fn settle(&self, handle: usize, thought: Thought) -> Result<String> {
        let answer = match thought {
            // Recoverable failure — rendered to the user as-is, no reflection
            Thought::Error(message) => message,
            other => {
                let text = self.context.resolve(other).await?;
                self.reflect(handle, text).await?
            }
        };

        self.context.finish(handle, &answer, &self.name).await?;
        Ok(answer)
    }

    /// Run the configured self-critique pass over an answer.
    async fn reflect(&self, handle: usize, answer: String) -> Result<String> {
        match self.config.reflection {
            ReflectionMode::Off => Ok(answer),
            ReflectionMode::Inline => self.reflect_inline(handle, answer).await,
            ReflectionMode::Service => {
                let goal = self.context.last_user_text().unwrap_or_default();
                let reflector =
                    ReflectionService::new(self.service.clone(), self.config.max_revisions);
                reflector.run(&self.context, handle, &goal, answer).await
            }
        }
    }

    /// Inline good/bad reflection: one tool-selection round classifying the
    /// answer as JSON. `good` keeps the answer unchanged; `bad` swaps in the
    /// provided revision; anything unparseable skips the pass.
    async fn reflect_inline(&self, handle: usize, answer: String) -> Result<String> {
        self.context.advance(handle, InteractionStatus::Reflecting);

        let goal = self.context.last_user_text().unwrap_or_default();
        let prompt = format!(
            "You review an assistant's answer to a user request.\n\
             Respond with JSON only: {{\"evaluation\": \"good\"}} when the answer \
             serves the request, or {{\"evaluation\": \"bad\", \"revision\": \"<corrected answer>\"}} \
             when it does not.\n\nRequest:\n{goal}\n\nAnswer:\n{answer}"
        );
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user("Evaluate the answer."),
        ];

        let request =
            ToolsCallRequest::new(messages, Vec::new()).with_format(ResponseFormat::Json);
        let raw = match self.service.tools_call(request).await {
            Thought::Message(text) => text,
            Thought::Error(error) => {
                warn!(agent = %self.name, %error, "Reflection call failed; keeping answer");
                return Ok(answer);
            }
            other => {
                warn!(agent = %self.name, kind = other.kind(), "Reflection returned no message; keeping answer");
                return Ok(answer);
            }
        };

        let verdict: InlineVerdict = match serde_json::from_str(&raw) {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(agent = %self.name, %raw, "Invalid JSON format; reflection skipped");
                return Ok(answer);
            }
        };

        match (verdict.evaluation.as_str(), verdict.revision) {
            ("good", _) => Ok(answer),
            ("bad", Some(revision)) => {
                // A revision re-enters execution before completing
                self.context.advance(handle, InteractionStatus::Executing);
                Ok(revision)
            }
            (evaluation, _) => {
                warn!(agent = %self.name, %evaluation, "Unusable reflection verdict; keeping answer");
                Ok(answer)
            }
        }
    }
}

/// Rebuild the thought a `reply` action carries.
fn reply_thought(action: &Action) -> Thought {
    if let Some(error) = action.string_arg("error") {
        Thought::Error(error.to_string())
    } else {
        Thought::Message(action.string_arg("text").unwrap_or_default().to_string())
    }
}

#[async_trait]
impl Agent for ThoughtAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn tools(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    fn conversation(&self) -> Arc<Mutex<Conversation>> {
        self.context.conversation()
    }

    fn set_message_observer(&self, observer: MessageObserver) {
        self.context.set_observer(observer);
    }

    fn cancel_token(&self) -> CancelToken {
        self.context.cancel_token()
    }

    async fn chat(&self, text: &str) -> Result<String> {
        let turn = self.start(ChatMessage::user(text)).await?;
        let Some(environment) = turn.environment else {
            return self.canned_reply(turn.handle).await;
        };

        self.context.advance(turn.handle, InteractionStatus::Planning);
        let planned = self.plan(&environment).await;

        let thought = match planned {
            Thought::Actions(actions) => {
                let actions = self.track_dialogue_state(turn.handle, actions);
                self.execute(turn.handle, &environment, actions).await?
            }
            // The model answered (or failed) instead of selecting a tool
            other => {
                self.context.advance(turn.handle, InteractionStatus::Executing);
                other
            }
        };

        self.settle(turn.handle, thought).await
    }

    async fn execute_command(&self, actions: Vec<Action>, message: ChatMessage) -> Result<String> {
        let turn = self.start(message).await?;
        let Some(environment) = turn.environment else {
            return self.canned_reply(turn.handle).await;
        };

        let actions = self.track_dialogue_state(turn.handle, actions);
        let thought = self.execute(turn.handle, &environment, actions).await?;
        self.settle(turn.handle, thought).await
    }
}
