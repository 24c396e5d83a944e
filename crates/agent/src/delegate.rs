//! DelegateAgent — text-prefix routing among agents sharing one conversation.
//!
//! Raw user text is parsed for a leading `/command` token or an `@agent`
//! mention. A matched mention makes the addressed agent the active one for
//! this and all following turns; a recognized command force-resets the active
//! agent back to the initial one and dispatches the command as a one-action
//! plan. Everything else goes verbatim to whichever agent is active.

use crate::agent::Agent;
use regex::Regex;
use sidekick_core::conversation::Conversation;
use sidekick_core::error::Result;
use sidekick_core::message::ChatMessage;
use sidekick_core::thought::{Action, MessageObserver, USER_INPUT_ARG};
use std::sync::{Arc, LazyLock, Mutex};
use tracing::debug;

static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)/(\w+)\s+").expect("command regex should compile"));

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)@(\w+)\s+").expect("mention regex should compile"));

/// Extract a `/command` token and the user input following it.
fn parse_command(text: &str) -> Option<(String, String)> {
    let captures = COMMAND_RE.captures(text)?;
    let command = captures.get(1)?.as_str().to_string();
    let rest = text[captures.get(0)?.end()..].trim().to_string();
    Some((command, rest))
}

/// Extract an `@agent` mention.
fn parse_mention(text: &str) -> Option<String> {
    let captures = MENTION_RE.captures(text)?;
    Some(captures.get(1)?.as_str().to_string())
}

/// A router in front of a primary agent and a roster of named agents.
pub struct DelegateAgent {
    init_agent: Arc<dyn Agent>,
    agents: Vec<Arc<dyn Agent>>,
    commands: Vec<String>,
    current: Mutex<Arc<dyn Agent>>,
    enable_chitchat: bool,
}

impl DelegateAgent {
    pub fn new(
        init_agent: Arc<dyn Agent>,
        agents: Vec<Arc<dyn Agent>>,
        commands: Vec<String>,
        enable_chitchat: bool,
    ) -> Self {
        Self {
            current: Mutex::new(init_agent.clone()),
            init_agent,
            agents,
            commands,
            enable_chitchat,
        }
    }

    /// The command names the router recognizes (for UI listings).
    pub fn command_options(&self) -> Vec<String> {
        self.commands.clone()
    }

    /// The mentionable agent names (for UI listings).
    pub fn agent_options(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    /// Name of the agent currently receiving free text.
    pub fn current_agent_name(&self) -> String {
        self.current.lock().unwrap().name().to_string()
    }

    /// The conversation the active agent appends to.
    pub fn conversation(&self) -> Arc<Mutex<Conversation>> {
        self.current.lock().unwrap().conversation()
    }

    /// Register the live partial-text listener on every agent.
    pub fn on_message_change(&self, observer: MessageObserver) {
        self.init_agent.set_message_observer(observer.clone());
        for agent in &self.agents {
            agent.set_message_observer(observer.clone());
        }
    }

    /// Stop stream consumption for the current turn on every agent.
    pub fn cancel(&self) {
        self.init_agent.cancel_token().cancel();
        for agent in &self.agents {
            agent.cancel_token().cancel();
        }
    }

    fn find_agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .iter()
            .chain(std::iter::once(&self.init_agent))
            .find(|a| a.name() == name)
            .cloned()
    }

    /// Route one raw user turn.
    pub async fn chat(&self, text: &str) -> Result<String> {
        if let Some(name) = parse_mention(text)
            && let Some(agent) = self.find_agent(&name)
        {
            debug!(agent = %name, "Mention switched the active agent");
            *self.current.lock().unwrap() = agent.clone();
            return agent.chat(text).await;
        }

        if let Some((command, user_input)) = parse_command(text)
            && self.commands.contains(&command)
        {
            debug!(command = %command, "Command reset the active agent");
            *self.current.lock().unwrap() = self.init_agent.clone();
            return self
                .execute_command_with_user_input(&command, &user_input, text)
                .await;
        }

        let agent = self.current.lock().unwrap().clone();
        agent.chat(text).await
    }

    /// Dispatch a recognized command as a one-action plan on the active
    /// agent.
    ///
    /// A command with no matching tool falls back to plain chat when
    /// chit-chat is enabled; otherwise it answers with the recoverable
    /// "Unexpected tool call" error.
    async fn execute_command_with_user_input(
        &self,
        command: &str,
        user_input: &str,
        original_text: &str,
    ) -> Result<String> {
        let agent = self.current.lock().unwrap().clone();
        let message = ChatMessage::user(original_text);

        if agent.tools().iter().any(|t| t.name == command) {
            let actions = vec![Action::new(
                command,
                serde_json::json!({ USER_INPUT_ARG: user_input }),
            )];
            return agent.execute_command(actions, message).await;
        }

        if self.enable_chitchat {
            return agent.execute_command(Vec::new(), message).await;
        }

        agent
            .execute_command(vec![Action::reply_error("Unexpected tool call")], message)
            .await
    }
}
