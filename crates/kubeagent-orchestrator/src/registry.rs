use kubeagent_agent::Agent;
use kubeagent_core::{AgentType, KubeAgentError, KubeAgentResult, Task};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct RegistryInner {
    /// Registration order; drives capability-based selection.
    order: Vec<Arc<dyn Agent>>,
    by_type: HashMap<AgentType, usize>,
}

/// Worker agents keyed by capability type, one per type.
///
/// Selection is deterministic: an explicit assignment wins, otherwise the
/// earliest registered agent that can handle the task type.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
}

impl AgentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker. The first registration for a type stays authoritative.
    pub fn register(&self, agent: Arc<dyn Agent>) -> KubeAgentResult<()> {
        let agent_type = agent.agent_type();
        if agent.name().trim().is_empty() {
            return Err(KubeAgentError::InvalidAgent(format!(
                "agent of type {agent_type} has an empty name"
            )));
        }
        if agent_type == AgentType::Coordinator {
            return Err(KubeAgentError::InvalidAgent(
                "cannot register coordinator as specialist agent".to_string(),
            ));
        }

        let mut inner = self.inner.write();
        if inner.by_type.contains_key(&agent_type) {
            return Err(KubeAgentError::DuplicateAgent(agent_type.to_string()));
        }
        let index = inner.order.len();
        inner.order.push(Arc::clone(&agent));
        inner.by_type.insert(agent_type.clone(), index);

        info!(agent_type = %agent_type, agent_name = %agent.name(), "Registered agent");
        Ok(())
    }

    /// The agent registered for `agent_type`.
    pub fn get(&self, agent_type: &AgentType) -> KubeAgentResult<Arc<dyn Agent>> {
        let inner = self.inner.read();
        inner
            .by_type
            .get(agent_type)
            .map(|&idx| Arc::clone(&inner.order[idx]))
            .ok_or_else(|| KubeAgentError::not_found("agent", agent_type.as_str()))
    }

    /// Pick the worker for `task`.
    pub fn select_for(&self, task: &Task) -> KubeAgentResult<Arc<dyn Agent>> {
        if let Some(assigned) = &task.assigned_agent {
            match self.get(assigned) {
                Ok(agent) => return Ok(agent),
                Err(_) => debug!(
                    task_id = %task.id,
                    assigned = %assigned,
                    "Assigned agent not registered, selecting by capability"
                ),
            }
        }

        let inner = self.inner.read();
        inner
            .order
            .iter()
            .find(|agent| agent.can_handle(&task.task_type))
            .map(Arc::clone)
            .ok_or_else(|| KubeAgentError::NoCapableAgent(task.task_type.to_string()))
    }

    /// Registered agents in registration order.
    pub fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.inner.read().order.clone()
    }

    /// Registered types in registration order.
    pub fn agent_types(&self) -> Vec<AgentType> {
        self.inner
            .read()
            .order
            .iter()
            .map(|a| a.agent_type())
            .collect()
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Whether no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
