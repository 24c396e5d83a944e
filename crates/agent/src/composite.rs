//! CompositeAgent — several agents behind one tool catalog.
//!
//! On construction the composite absorbs every sub-agent's tools into its own
//! catalog and remembers which sub-agent owns each tool name. Planning runs
//! against the merged catalog; an action the composite cannot dispatch itself
//! is forwarded to the owning sub-agent's own execution. An action name
//! nobody owns is a fatal configuration error, not retried.

use crate::agent::Agent;
use crate::thought_agent::{ActionRouter, ThoughtAgent};
use async_trait::async_trait;
use sidekick_core::conversation::Conversation;
use sidekick_core::error::{AgentError, Result};
use sidekick_core::message::ChatMessage;
use sidekick_core::thought::{Action, CancelToken, MessageObserver, Thought};
use sidekick_core::tool::Tool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Routes foreign actions to the sub-agent owning the tool name.
struct CompositeRouter {
    composite: String,
    routes: HashMap<String, Arc<ThoughtAgent>>,
}

#[async_trait]
impl ActionRouter for CompositeRouter {
    async fn route(&self, _agent_name: &str, action: Action) -> Result<Thought> {
        match self.routes.get(&action.name) {
            Some(owner) => {
                debug!(
                    composite = %self.composite,
                    owner = %Agent::name(owner.as_ref()),
                    action = %action.name,
                    "Forwarding action to owning sub-agent"
                );
                owner.execute_routed(action).await
            }
            None => Err(AgentError::UnexpectedCompositeAction {
                agent: self.composite.clone(),
                action: action.name,
            }
            .into()),
        }
    }
}

/// Aggregates several `ThoughtAgent`s into one.
///
/// Sub-agents must share the front agent's conversation so that routed
/// actions operate on the interaction the composite opened.
pub struct CompositeAgent {
    inner: ThoughtAgent,
    sub_agent_names: Vec<String>,
}

impl CompositeAgent {
    pub fn new(mut front: ThoughtAgent, sub_agents: Vec<Arc<ThoughtAgent>>) -> Self {
        let mut routes: HashMap<String, Arc<ThoughtAgent>> = HashMap::new();
        let mut sub_agent_names = Vec::new();

        for sub in &sub_agents {
            sub_agent_names.push(Agent::name(sub.as_ref()).to_string());
            for tool in sub.tools() {
                routes.insert(tool.name.clone(), sub.clone());
                front.push_tool(tool);
            }
        }

        front.set_router(Arc::new(CompositeRouter {
            composite: Agent::name(&front).to_string(),
            routes,
        }));

        Self {
            inner: front,
            sub_agent_names,
        }
    }

    /// Names of the absorbed sub-agents.
    pub fn sub_agent_names(&self) -> &[String] {
        &self.sub_agent_names
    }
}

#[async_trait]
impl Agent for CompositeAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn tools(&self) -> Vec<Tool> {
        self.inner.tools()
    }

    fn conversation(&self) -> Arc<Mutex<Conversation>> {
        self.inner.conversation()
    }

    fn set_message_observer(&self, observer: MessageObserver) {
        self.inner.set_message_observer(observer);
    }

    fn cancel_token(&self) -> CancelToken {
        self.inner.cancel_token()
    }

    async fn chat(&self, text: &str) -> Result<String> {
        self.inner.chat(text).await
    }

    async fn execute_command(&self, actions: Vec<Action>, message: ChatMessage) -> Result<String> {
        self.inner.execute_command(actions, message).await
    }
}
