use super::input_str;
use crate::agent::{Agent, BaseAgent, Specialist};
use crate::config::AgentConfig;
use crate::llm::LlmClient;
use crate::metrics::AgentMetrics;
use crate::parse::parse_json_object;
use async_trait::async_trait;
use kubeagent_core::{
    AgentContext, AgentType, KubeAgentError, KubeAgentResult, Payload, Task, TaskType,
    ToolRegistry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

const SYSTEM_PROMPT: &str = r#"You are a Kubernetes diagnostics expert. Analyze pod issues and provide detailed diagnosis.

Your task is to:
1. Identify the root cause of the issue
2. Classify the error type (OOMKilled, CrashLoopBackOff, ImagePullBackOff, etc.)
3. Provide specific recommendations for fixing the issue
4. Estimate confidence level

Return your analysis in JSON format:
{
  "root_cause": "Detailed explanation of the root cause",
  "error_type": "Error classification",
  "key_errors": ["Error 1", "Error 2"],
  "recommendations": ["Recommendation 1", "Recommendation 2"],
  "confidence": 0.95
}"#;

/// Diagnoses pod failures from a description and optional pod coordinates.
///
/// Handles `diagnose` and `query` tasks. Reads `pod_name` (or `podName`) and
/// `namespace` (default `"default"`) from the task input.
pub struct Diagnostician {
    base: BaseAgent,
}

impl Diagnostician {
    /// Diagnostician with its default config.
    pub fn new(llm: LlmClient) -> Self {
        Self::with_config(
            AgentConfig::new(
                "diagnostician",
                AgentType::Diagnostician,
                "Diagnoses pod failures, analyzes logs, events, and metrics",
            ),
            llm,
        )
    }

    /// Diagnostician with a custom config.
    pub fn with_config(config: AgentConfig, llm: LlmClient) -> Self {
        Self {
            base: BaseAgent::new(config, llm),
        }
    }

    /// Give the agent access to tools.
    pub fn with_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.base = self.base.with_tools(registry);
        self
    }

    /// Shared plumbing.
    pub fn base(&self) -> &BaseAgent {
        &self.base
    }

    async fn diagnose(
        &self,
        ctx: &AgentContext,
        task: &Task,
        pod_name: &str,
        namespace: &str,
    ) -> KubeAgentResult<Payload> {
        let user_prompt = format!(
            "Diagnose the following Kubernetes pod issue:\n\n\
             Pod Name: {pod_name}\n\
             Namespace: {namespace}\n\
             Issue Description: {}\n\n\
             Provide a comprehensive diagnosis in JSON format.",
            task.description
        );

        let response = if self.base.tools().is_empty() {
            self.base.call_llm(ctx, SYSTEM_PROMPT, &user_prompt).await
        } else {
            self.base
                .run_tool_loop(ctx, task, SYSTEM_PROMPT, &user_prompt)
                .await
        }
        .map_err(|e| KubeAgentError::TaskExecution {
            task_id: task.id.clone(),
            reason: format!("diagnosis failed: {e}"),
        })?;

        Ok(parse_json_object(&response).unwrap_or_else(|| fallback_diagnosis(&response)))
    }
}

fn fallback_diagnosis(raw: &str) -> Payload {
    let mut map = Payload::new();
    map.insert("root_cause".into(), json!(raw));
    map.insert("error_type".into(), json!("Unknown"));
    map.insert(
        "recommendations".into(),
        json!(["Check pod logs and events for more details"]),
    );
    map.insert("confidence".into(), json!(0.5));
    map
}

#[async_trait]
impl Agent for Diagnostician {
    fn config(&self) -> &AgentConfig {
        self.base.config()
    }

    fn can_handle(&self, task_type: &TaskType) -> bool {
        matches!(task_type, TaskType::Diagnose | TaskType::Query)
    }

    async fn execute(&self, ctx: &AgentContext, mut task: Task) -> KubeAgentResult<Task> {
        let started = Instant::now();
        let pod_name = input_str(&task.input, &["pod_name", "podName"])
            .unwrap_or_default()
            .to_string();
        let namespace = input_str(&task.input, &["namespace"])
            .unwrap_or("default")
            .to_string();

        info!(task_id = %task.id, pod = %pod_name, namespace = %namespace, "Diagnosing");

        let diagnosis = self
            .base
            .timed(self.diagnose(ctx, &task, &pod_name, &namespace))
            .await?;

        let mut output = Payload::new();
        output.insert("pod_name".into(), json!(pod_name));
        output.insert("namespace".into(), json!(namespace));
        for key in ["root_cause", "error_type", "recommendations", "confidence"] {
            output.insert(
                key.into(),
                diagnosis.get(key).cloned().unwrap_or(serde_json::Value::Null),
            );
        }
        output.insert(
            "diagnosis_time_ms".into(),
            json!(started.elapsed().as_millis() as u64),
        );
        task.output = Some(output);
        Ok(task)
    }

    fn metrics(&self) -> Option<AgentMetrics> {
        Some(self.base.metrics().snapshot())
    }
}

#[async_trait]
impl Specialist for Diagnostician {
    async fn analyze(&self, ctx: &AgentContext, input: &Payload) -> KubeAgentResult<Payload> {
        let description = input_str(input, &["description"]).unwrap_or_default();
        let task =
            Task::with_generated_id(TaskType::Diagnose, description).with_input(input.clone());
        let pod_name = input_str(input, &["pod_name", "podName"]).unwrap_or_default();
        let namespace = input_str(input, &["namespace"]).unwrap_or("default");
        self.diagnose(ctx, &task, pod_name, namespace).await
    }
}
