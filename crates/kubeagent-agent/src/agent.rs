use crate::backends::openai::TOOL_CALLS_METADATA_KEY;
use crate::config::AgentConfig;
use crate::llm::LlmClient;
use crate::metrics::{AgentMetrics, MetricsTracker};
use crate::retry::{is_retryable, RetryPolicy};
use async_trait::async_trait;
use kubeagent_core::{
    AgentContext, AgentType, Conversation, KubeAgentError, KubeAgentResult, Message, Payload,
    Task, TaskType, Tool, ToolRegistry, ToolResult,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const DEFAULT_MAX_TURNS: u32 = 10;

/// A worker that executes tasks.
///
/// `execute` fills in the task's output and returns it; the caller owns the
/// task's status and timestamps.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Static identity and limits of this agent.
    fn config(&self) -> &AgentConfig;

    /// Display name, taken from the config.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Capability tag, taken from the config.
    fn agent_type(&self) -> AgentType {
        self.config().agent_type.clone()
    }

    /// Whether this agent declares the capability for `task_type`.
    fn can_handle(&self, task_type: &TaskType) -> bool;

    /// Run one task and return it with `output` filled in.
    async fn execute(&self, ctx: &AgentContext, task: Task) -> KubeAgentResult<Task>;

    /// Execution counters, for agents that keep them.
    fn metrics(&self) -> Option<AgentMetrics> {
        None
    }
}

/// A worker that can also answer free-form analysis requests.
#[async_trait]
pub trait Specialist: Agent {
    /// Analyze an arbitrary input payload outside of a plan.
    async fn analyze(&self, ctx: &AgentContext, input: &Payload) -> KubeAgentResult<Payload>;
}

/// Shared plumbing for LLM-backed agents: metrics, retrying LLM calls and a
/// tool-calling loop.
pub struct BaseAgent {
    config: AgentConfig,
    llm: LlmClient,
    tools: Option<Arc<ToolRegistry>>,
    metrics: MetricsTracker,
    retry: RetryPolicy,
}

impl BaseAgent {
    /// Wrap `config` and `llm`. The retry policy follows `config.max_retries`.
    pub fn new(config: AgentConfig, llm: LlmClient) -> Self {
        let metrics = MetricsTracker::new(config.agent_type.clone());
        let retry = RetryPolicy::with_max_retries(config.max_retries);
        Self {
            config,
            llm,
            tools: None,
            metrics,
            retry,
        }
    }

    /// Give the agent access to the tools `registry` grants its type.
    pub fn with_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        info!(
            agent_type = %self.config.agent_type,
            tools = registry.tools_for_agent(&self.config.agent_type).len(),
            "Attached tool registry"
        );
        self.tools = Some(registry);
        self
    }

    /// Override the retry policy derived from the config.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The agent's configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The LLM client used by this agent.
    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    /// Execution counters for this agent.
    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    /// Tools available to this agent's type.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .as_ref()
            .map(|r| r.tools_for_agent(&self.config.agent_type))
            .unwrap_or_default()
    }

    /// Await `fut` and record its duration and outcome.
    pub async fn timed<T, F>(&self, fut: F) -> KubeAgentResult<T>
    where
        F: Future<Output = KubeAgentResult<T>> + Send,
    {
        let started = Instant::now();
        let result = fut.await;
        self.metrics.record(started.elapsed(), result.is_ok());
        result
    }

    /// One system + user exchange, retrying transient failures.
    pub async fn call_llm(
        &self,
        ctx: &AgentContext,
        system_prompt: &str,
        user_prompt: &str,
    ) -> KubeAgentResult<String> {
        let messages = [Message::system(system_prompt), Message::user(user_prompt)];
        let mut attempt = 0;
        loop {
            match self.llm.complete(&messages).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.retry.max_retries && is_retryable(&e) => {
                    let delay = self.retry.backoff_ms(attempt);
                    warn!(
                        agent_type = %self.config.agent_type,
                        request_id = %ctx.request_id,
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "Retryable LLM error, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        agent_type = %self.config.agent_type,
                        request_id = %ctx.request_id,
                        error = %e,
                        "LLM call failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Prompt, run requested tools, feed results back, repeat until the model
    /// answers without tool calls.
    pub async fn run_tool_loop(
        &self,
        ctx: &AgentContext,
        task: &Task,
        system_prompt: &str,
        user_prompt: &str,
    ) -> KubeAgentResult<String> {
        let max_turns = self
            .config
            .llm
            .as_ref()
            .map(|m| m.max_turns)
            .unwrap_or(DEFAULT_MAX_TURNS);
        let tools = self.tools();

        let mut conversation = Conversation::new(100);
        conversation.set_system_prompt(system_prompt);
        conversation.push_user(user_prompt);

        for turn in 0..max_turns {
            if ctx.is_cancelled() {
                return Err(KubeAgentError::TaskExecution {
                    task_id: task.id.clone(),
                    reason: "cancelled".to_string(),
                });
            }

            let response = self
                .llm
                .complete_with_tools(&conversation.to_messages(), &tools)
                .await?;

            if !response.has_tool_calls() {
                info!(task_id = %task.id, turns = turn + 1, "Tool loop completed");
                return Ok(response.content);
            }

            let mut assistant = Message::assistant(response.content.clone());
            assistant.metadata.insert(
                TOOL_CALLS_METADATA_KEY.to_string(),
                serde_json::to_value(&response.tool_calls)?,
            );
            conversation.push(assistant);

            for call in &response.tool_calls {
                info!(
                    task_id = %task.id,
                    tool = %call.name,
                    call_id = %call.id,
                    "Executing tool call"
                );
                let result = match &self.tools {
                    Some(registry) if tools.iter().any(|t| t.name() == call.name) => {
                        registry.execute(call).await
                    }
                    _ => ToolResult::error(
                        &call.id,
                        format!("Tool not available to this agent: {}", call.name),
                    ),
                };
                conversation.push(Message::tool(result.call_id, result.content));
            }
        }

        warn!(task_id = %task.id, max_turns, "Tool loop reached max turns");
        Err(KubeAgentError::TaskExecution {
            task_id: task.id.clone(),
            reason: format!("tool loop exceeded maximum of {max_turns} turns"),
        })
    }
}
