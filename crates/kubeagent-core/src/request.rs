use crate::task::{AgentType, Payload, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A user request entering the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request id.
    pub id: String,
    /// Requesting user.
    pub user: String,
    /// Free-text ask, e.g. "why is pod web-1 crashing?".
    pub input: String,
    /// Pre-classified intent. When absent the planner asks the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Structured context; becomes the input of the fallback task.
    #[serde(default)]
    pub context: Payload,
    /// Free-form string metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// Request with a fresh id and empty context.
    pub fn new(user: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user: user.into(),
            input: input.into(),
            intent: None,
            context: Payload::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Set a pre-classified intent.
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Set the structured context.
    pub fn with_context(mut self, context: Payload) -> Self {
        self.context = context;
        self
    }
}

/// The aggregated outcome of one plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers.
    pub request_id: String,
    /// `completed`, `failed` or `cancelled`.
    pub status: TaskStatus,
    /// Human-readable summary.
    pub result: String,
    /// Output payload of every completed task, keyed by task id.
    #[serde(default)]
    pub data: HashMap<String, Payload>,
    /// One `Task {id} failed: {reason}` entry per failed task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Agent type of every completed task, in completion order.
    pub executed_by: Vec<AgentType>,
    /// Wall-clock time of the run.
    pub duration_ms: u64,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

impl Response {
    /// Whether the run completed without failed tasks.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
