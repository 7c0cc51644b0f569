//! Scripted worker used by the unit tests of this crate.

use async_trait::async_trait;
use kubeagent_agent::{Agent, AgentConfig};
use kubeagent_core::{AgentContext, AgentType, KubeAgentError, KubeAgentResult, Task, TaskType};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct StubAgent {
    config: AgentConfig,
    handles: Vec<TaskType>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    seen: Mutex<Vec<String>>,
}

impl StubAgent {
    pub(crate) fn new(
        name: &str,
        agent_type: AgentType,
        handles: impl IntoIterator<Item = TaskType>,
    ) -> Self {
        Self {
            config: AgentConfig::new(name, agent_type, "stub"),
            handles: handles.into_iter().collect(),
            failing: HashSet::new(),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Fail every task whose id is listed.
    pub(crate) fn failing_on(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub(crate) fn into_arc(self) -> Arc<dyn Agent> {
        Arc::new(self)
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn can_handle(&self, task_type: &TaskType) -> bool {
        self.handles.contains(task_type)
    }

    async fn execute(&self, _ctx: &AgentContext, mut task: Task) -> KubeAgentResult<Task> {
        self.seen.lock().push(task.id.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&task.id) {
            return Err(KubeAgentError::TaskExecution {
                task_id: task.id.clone(),
                reason: "stub failure".to_string(),
            });
        }
        let mut output = kubeagent_core::Payload::new();
        output.insert("handled_by".into(), json!(self.config.name));
        task.output = Some(output);
        Ok(task)
    }
}
