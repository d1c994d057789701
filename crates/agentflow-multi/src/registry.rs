use std::sync::Arc;

use agentflow_kernel::{Agent, Env, Environment, Trace};
use agentflow_protocol::{KernelError, KernelResult};
use indexmap::IndexMap;
use serde_json::Value;

use crate::state::MultiState;

/// An agent over [`MultiState`] running in a [`MultiEnv`].
pub type MultiAgent<V = Value> = Agent<MultiState, V, MultiEnv>;

/// Named agents available to `handoff` and `route`, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: IndexMap<String, MultiAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, agent: MultiAgent) -> &mut Self {
        self.agents.insert(name.into(), agent);
        self
    }

    pub fn with(mut self, name: impl Into<String>, agent: MultiAgent) -> Self {
        self.register(name, agent);
        self
    }

    pub fn get(&self, name: &str) -> KernelResult<MultiAgent> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::AgentNotFound(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// The default [`Env`] plus a shared registry.
#[derive(Debug, Clone, Default)]
pub struct MultiEnv {
    env: Env,
    registry: Arc<AgentRegistry>,
}

impl MultiEnv {
    pub fn new(env: Env, registry: AgentRegistry) -> Self {
        Self {
            env,
            registry: Arc::new(registry),
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }
}

impl Environment for MultiEnv {
    fn trace(&self) -> Option<&Trace> {
        self.env.trace()
    }

    fn with_trace(&self, trace: Trace) -> Self {
        Self {
            env: self.env.with_trace(trace),
            registry: Arc::clone(&self.registry),
        }
    }
}
