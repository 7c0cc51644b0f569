use kubeagent_agent::parse::strip_code_fence;
use kubeagent_agent::LlmClient;
use kubeagent_core::{
    AgentContext, ExecutionPlan, KubeAgentError, KubeAgentResult, Message, Payload, Request,
    Task, TaskCondition, TaskType,
};
use kubeagent_store::StateStore;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const INTENT_SYSTEM_PROMPT: &str = "You are a Kubernetes operations assistant.";
const DECOMPOSE_SYSTEM_PROMPT: &str =
    "You are a task decomposition expert for Kubernetes operations.";

/// Intent used when the model answers with nothing usable.
const DEFAULT_INTENT: &str = "query";

/// One element of the decomposition array returned by the model.
#[derive(Debug, Deserialize)]
struct TaskDescriptor {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    task_type: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    assigned_agent: Option<String>,
    #[serde(default)]
    input: Option<Payload>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
    #[serde(default)]
    condition: Option<TaskCondition>,
}

impl TaskDescriptor {
    fn into_task(self, intent: &str) -> Task {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let task_type = self
            .task_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| intent.to_string());

        let mut task = Task::new(id, task_type, self.description)
            .with_input(self.input.unwrap_or_default())
            .with_dependencies(self.dependencies.unwrap_or_default());
        if let Some(agent) = self.assigned_agent.filter(|a| !a.trim().is_empty()) {
            task = task.assigned_to(agent);
        }

        if let Some(condition) = self.condition.filter(|c| !c.is_empty()) {
            // A gated task must wait for the tasks its condition reads.
            let missing: Vec<String> = condition
                .referenced_ids()
                .filter(|id| !task.dependencies.iter().any(|d| d.as_str() == *id))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                debug!(
                    task_id = %task.id,
                    added = ?missing,
                    "Adding condition ids to dependencies"
                );
                task.dependencies.extend(missing);
            }
            task = task.with_condition(condition);
        }
        task
    }
}

/// Turns a free-text request into an [`ExecutionPlan`] with the help of the
/// language model.
pub struct Planner {
    llm: LlmClient,
    store: Arc<dyn StateStore>,
}

impl Planner {
    /// Planner using `llm` and saving plans to `store`.
    pub fn new(llm: LlmClient, store: Arc<dyn StateStore>) -> Self {
        Self { llm, store }
    }

    /// Classify the request, decompose it and save the resulting plan.
    pub async fn plan(
        &self,
        ctx: &AgentContext,
        request: &Request,
    ) -> KubeAgentResult<ExecutionPlan> {
        info!(
            request_id = %request.id,
            user = %request.user,
            input = %request.input,
            "Creating execution plan"
        );

        let intent = self.classify_intent(request).await?;
        let tasks = self.decompose(request, &intent).await?;

        let plan = ExecutionPlan::new(request.id.clone(), tasks)
            .with_metadata("intent", json!(intent))
            .with_metadata("input", json!(request.input));
        ctx.set_plan_id(plan.id.clone());

        if let Err(e) = self.store.save_plan(&plan).await {
            warn!(plan_id = %plan.id, error = %e, "Failed to save execution plan");
        }

        info!(
            plan_id = %plan.id,
            task_count = plan.tasks.len(),
            execution_mode = ?plan.execution_mode,
            intent = %intent,
            "Execution plan created"
        );
        Ok(plan)
    }

    /// The request's own intent, or the model's one-word classification.
    pub async fn classify_intent(&self, request: &Request) -> KubeAgentResult<String> {
        if let Some(intent) = request.intent.as_deref().filter(|i| !i.trim().is_empty()) {
            return Ok(intent.to_string());
        }

        let prompt = format!(
            "Analyze the following user request and identify the primary intent.\n\n\
             User Request: {}\n\n\
             Classify the intent into one of these categories:\n\
             - diagnose: User wants to diagnose a problem\n\
             - remediate: User wants to fix a problem\n\
             - audit: User wants to check security or compliance\n\
             - optimize: User wants to optimize resources or costs\n\
             - query: User wants to get information\n\n\
             Respond with only the intent category (one word).",
            request.input
        );
        let reply = self
            .llm
            .complete(&[Message::system(INTENT_SYSTEM_PROMPT), Message::user(prompt)])
            .await?;
        Ok(normalize_intent(&reply))
    }

    /// Ask the model for a task array. Unparseable replies yield a single
    /// task covering the whole request.
    pub async fn decompose(&self, request: &Request, intent: &str) -> KubeAgentResult<Vec<Task>> {
        let prompt = decomposition_prompt(&request.input, intent);
        let reply = self
            .llm
            .complete(&[Message::system(DECOMPOSE_SYSTEM_PROMPT), Message::user(prompt)])
            .await?;

        match parse_decomposition(&reply, intent) {
            Ok(tasks) => Ok(tasks),
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Creating single fallback task");
                Ok(vec![Task::with_generated_id(TaskType::from(intent), request.input.clone())
                    .with_input(request.context.clone())])
            }
        }
    }
}

/// Lower-cased first word of the reply, without surrounding punctuation.
fn normalize_intent(reply: &str) -> String {
    let word = reply
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_lowercase();
    if word.is_empty() {
        DEFAULT_INTENT.to_string()
    } else {
        word
    }
}

fn decomposition_prompt(input: &str, intent: &str) -> String {
    format!(
        r#"Break down the following user request into specific tasks.

User Request: {input}
Intent: {intent}

Available Agent Types:
- diagnostician: Diagnose pod failures, analyze logs, events, metrics
- remediator: Generate fixes, create patches, remediate issues
- security: Audit RBAC, scan images, check compliance
- cost_optimizer: Analyze resource usage, recommend optimizations
- knowledge: Search documentation, find best practices

Return a JSON array of tasks with this structure:
[
  {{
    "id": "unique_task_id",
    "type": "diagnose|remediate|audit|optimize|query",
    "description": "Clear description of the task",
    "assigned_agent": "agent_type",
    "input": {{
      "key": "value"
    }},
    "dependencies": ["task_id1", "task_id2"],
    "condition": {{
      "on_success": ["task_id"],
      "on_failure": ["task_id"]
    }}
  }}
]

Notes:
- Each task must have a unique "id" field
- "dependencies" is an array of task IDs that must complete before this task can start
- If a task has no dependencies, use an empty array []
- Dependencies should form a valid directed acyclic graph (DAG) with no cycles
- "condition" is optional and defines when this task should execute:
  - "on_success": only execute if ALL specified tasks completed successfully
  - "on_failure": only execute if ANY specified task failed
  - If both are specified, on_success takes precedence
  - Tasks in condition must also be in dependencies
  - Omit condition for tasks that should always execute when dependencies are met

Respond with only the JSON array."#
    )
}

/// Parse a decomposition array (optionally fenced) into tasks. Tasks without
/// a type take `intent`; tasks without an id get a fresh UUID.
pub fn parse_decomposition(reply: &str, intent: &str) -> KubeAgentResult<Vec<Task>> {
    let descriptors: Vec<TaskDescriptor> = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| KubeAgentError::DecompositionParseFailure(e.to_string()))?;
    Ok(descriptors
        .into_iter()
        .map(|d| d.into_task(intent))
        .collect())
}
