use crate::{AgentType, KubeAgentError, KubeAgentResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// A capability an agent can invoke during an LLM tool-calling loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as exposed to the model.
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object, as a string.
    fn args_schema(&self) -> &str;

    /// Run the tool with already-parsed arguments.
    async fn execute(&self, params: serde_json::Value) -> KubeAgentResult<String>;
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: serde_json::Value,
}

/// The outcome of a [`ToolCall`], fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this answers.
    pub call_id: String,
    /// Tool output or error text.
    pub content: String,
    /// Whether the tool failed.
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Failed result.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Registry of named tools plus per-agent-type grants.
///
/// A tool with no grants is available to every agent type.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    grants: RwLock<HashMap<String, HashSet<AgentType>>>,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&self, tool: Arc<dyn Tool>) -> KubeAgentResult<()> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(KubeAgentError::Config("tool name must not be empty".into()));
        }
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(KubeAgentError::Config(format!(
                "tool already registered: {name}"
            )));
        }
        info!(tool = %name, "Registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// All tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.tools.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Restrict `tool_name` to the agent types granted so far.
    pub fn grant(&self, agent_type: AgentType, tool_name: impl Into<String>) {
        self.grants
            .write()
            .entry(tool_name.into())
            .or_default()
            .insert(agent_type);
    }

    /// Tools usable by `agent_type`, sorted by name.
    pub fn tools_for_agent(&self, agent_type: &AgentType) -> Vec<Arc<dyn Tool>> {
        let grants = self.grants.read();
        self.list()
            .into_iter()
            .filter(|tool| match grants.get(tool.name()) {
                Some(allowed) => allowed.contains(agent_type),
                None => true,
            })
            .collect()
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.read().len()
    }

    /// Execute a tool call. Unknown tools and tool failures become error results.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };
        match tool.execute(call.arguments.clone()).await {
            Ok(output) => ToolResult::success(&call.id, output),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, e.to_string())
            }
        }
    }
}
