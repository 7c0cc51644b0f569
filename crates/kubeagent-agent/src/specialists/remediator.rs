use super::input_str;
use crate::agent::{Agent, BaseAgent, Specialist};
use crate::config::AgentConfig;
use crate::llm::LlmClient;
use crate::metrics::AgentMetrics;
use crate::parse::parse_json_object;
use async_trait::async_trait;
use kubeagent_core::{
    AgentContext, AgentType, KubeAgentError, KubeAgentResult, Payload, Task, TaskType,
};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = r#"You are a Kubernetes remediation expert. Generate fixes for diagnosed issues.

Your task is to:
1. Generate appropriate remediation actions (patch, configuration change, etc.)
2. Provide verification steps
3. Assess risk level
4. Determine if human approval is required

Return your remediation plan in JSON format:
{
  "remediation_type": "patch|config_change|restart|scale",
  "patch": "YAML patch content or commands",
  "verification_steps": ["Step 1", "Step 2"],
  "requires_approval": true/false,
  "risk_level": "low|medium|high"
}"#;

const OUTPUT_KEYS: [&str; 5] = [
    "remediation_type",
    "patch",
    "verification_steps",
    "requires_approval",
    "risk_level",
];

/// Generates remediation plans for diagnosed issues. Handles `remediate` tasks.
///
/// The diagnosis comes from the task input (`diagnosis`, `root_cause`,
/// `error_type`), else from the published output of a dependency, else the
/// task description is used as the root cause.
pub struct Remediator {
    base: BaseAgent,
}

impl Remediator {
    /// Remediator with its default config.
    pub fn new(llm: LlmClient) -> Self {
        Self::with_config(
            AgentConfig::new(
                "remediator",
                AgentType::Remediator,
                "Generates fixes, creates patches, and remediates issues",
            ),
            llm,
        )
    }

    /// Remediator with a custom config.
    pub fn with_config(config: AgentConfig, llm: LlmClient) -> Self {
        Self {
            base: BaseAgent::new(config, llm),
        }
    }

    /// Shared plumbing.
    pub fn base(&self) -> &BaseAgent {
        &self.base
    }

    async fn generate_remediation(
        &self,
        ctx: &AgentContext,
        task_id: &str,
        root_cause: &str,
        error_type: &str,
        diagnosis: Option<&Payload>,
    ) -> KubeAgentResult<Payload> {
        let diagnosis_json = diagnosis
            .map(|d| serde_json::Value::Object(d.clone()))
            .unwrap_or(serde_json::Value::Null);
        let user_prompt = format!(
            "Generate a remediation plan for the following issue:\n\n\
             Root Cause: {root_cause}\n\
             Error Type: {error_type}\n\
             Diagnosis Details: {diagnosis_json}\n\n\
             Provide a comprehensive remediation plan in JSON format."
        );

        let response = self
            .base
            .call_llm(ctx, SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|e| KubeAgentError::TaskExecution {
                task_id: task_id.to_string(),
                reason: format!("remediation generation failed: {e}"),
            })?;

        Ok(parse_json_object(&response).unwrap_or_else(|| fallback_remediation(&response)))
    }
}

fn fallback_remediation(raw: &str) -> Payload {
    let mut map = Payload::new();
    map.insert("remediation_type".into(), json!("manual"));
    map.insert("patch".into(), json!(raw));
    map.insert(
        "verification_steps".into(),
        json!(["Apply patch and verify pod status"]),
    );
    map.insert("requires_approval".into(), json!(true));
    map.insert("risk_level".into(), json!("medium"));
    map
}

/// First dependency output that looks like a diagnosis.
fn upstream_diagnosis(ctx: &AgentContext, task: &Task) -> Option<Payload> {
    task.dependencies
        .iter()
        .filter_map(|dep| ctx.task_output(dep))
        .find(|out| out.contains_key("root_cause"))
}

#[async_trait]
impl Agent for Remediator {
    fn config(&self) -> &AgentConfig {
        self.base.config()
    }

    fn can_handle(&self, task_type: &TaskType) -> bool {
        matches!(task_type, TaskType::Remediate)
    }

    async fn execute(&self, ctx: &AgentContext, mut task: Task) -> KubeAgentResult<Task> {
        let started = Instant::now();

        let mut diagnosis = task
            .input
            .get("diagnosis")
            .and_then(|v| v.as_object())
            .cloned();
        let mut root_cause = input_str(&task.input, &["root_cause"])
            .unwrap_or_default()
            .to_string();
        let mut error_type = input_str(&task.input, &["error_type"])
            .unwrap_or_default()
            .to_string();

        if diagnosis.is_none() && root_cause.is_empty() {
            if let Some(upstream) = upstream_diagnosis(ctx, &task) {
                debug!(task_id = %task.id, "Using upstream diagnosis");
                root_cause = input_str(&upstream, &["root_cause"]).unwrap_or_default().to_string();
                error_type = input_str(&upstream, &["error_type"]).unwrap_or_default().to_string();
                diagnosis = Some(upstream);
            } else {
                root_cause = task.description.clone();
            }
        }

        info!(task_id = %task.id, error_type = %error_type, "Generating remediation");

        let remediation = self
            .base
            .timed(self.generate_remediation(
                ctx,
                &task.id,
                &root_cause,
                &error_type,
                diagnosis.as_ref(),
            ))
            .await?;

        let mut output = Payload::new();
        for key in OUTPUT_KEYS {
            output.insert(
                key.into(),
                remediation.get(key).cloned().unwrap_or(serde_json::Value::Null),
            );
        }
        output.insert(
            "remediation_time_ms".into(),
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
impl Specialist for Remediator {
    async fn analyze(&self, ctx: &AgentContext, input: &Payload) -> KubeAgentResult<Payload> {
        let diagnosis = input.get("diagnosis").and_then(|v| v.as_object());
        self.generate_remediation(
            ctx,
            "analysis",
            input_str(input, &["root_cause"]).unwrap_or_default(),
            input_str(input, &["error_type"]).unwrap_or_default(),
            diagnosis,
        )
        .await
    }
}
