use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Open JSON key-value payload carried by tasks. Opaque to the scheduler.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Category of work a task represents.
///
/// Unrecognised categories are kept verbatim in [`TaskType::Other`] so that a
/// decomposition naming a new category still round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    /// Find the root cause of a failure.
    Diagnose,
    /// Produce or apply a fix.
    Remediate,
    /// Security or compliance review.
    Audit,
    /// Resource or cost optimisation.
    Optimize,
    /// Information lookup.
    Query,
    /// Any other category.
    Other(String),
}

impl TaskType {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Diagnose => "diagnose",
            TaskType::Remediate => "remediate",
            TaskType::Audit => "audit",
            TaskType::Optimize => "optimize",
            TaskType::Query => "query",
            TaskType::Other(s) => s,
        }
    }
}

impl From<String> for TaskType {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "diagnose" => TaskType::Diagnose,
            "remediate" => TaskType::Remediate,
            "audit" => TaskType::Audit,
            "optimize" => TaskType::Optimize,
            "query" => TaskType::Query,
            _ => TaskType::Other(s),
        }
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        TaskType::from(s.to_string())
    }
}

impl From<TaskType> for String {
    fn from(t: TaskType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tag identifying a worker agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    /// The orchestrator itself. Never a dispatch target.
    Coordinator,
    /// Diagnoses pod failures from logs, events and metrics.
    Diagnostician,
    /// Generates fixes and patches.
    Remediator,
    /// RBAC, image and compliance audits.
    Security,
    /// Resource usage and cost recommendations.
    CostOptimizer,
    /// Documentation and best-practice lookup.
    Knowledge,
    /// Any other capability tag.
    Other(String),
}

impl AgentType {
    /// Canonical snake_case name.
    pub fn as_str(&self) -> &str {
        match self {
            AgentType::Coordinator => "coordinator",
            AgentType::Diagnostician => "diagnostician",
            AgentType::Remediator => "remediator",
            AgentType::Security => "security",
            AgentType::CostOptimizer => "cost_optimizer",
            AgentType::Knowledge => "knowledge",
            AgentType::Other(s) => s,
        }
    }
}

impl From<String> for AgentType {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "coordinator" => AgentType::Coordinator,
            "diagnostician" => AgentType::Diagnostician,
            "remediator" => AgentType::Remediator,
            "security" => AgentType::Security,
            "cost_optimizer" => AgentType::CostOptimizer,
            "knowledge" => AgentType::Knowledge,
            _ => AgentType::Other(s),
        }
    }
}

impl From<&str> for AgentType {
    fn from(s: &str) -> Self {
        AgentType::from(s.to_string())
    }
}

impl From<AgentType> for String {
    fn from(t: AgentType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet.
    Pending,
    /// Dispatched to an agent.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Never started because the run was cancelled.
    Cancelled,
    /// Not run because its condition did not hold.
    Skipped,
}

impl TaskStatus {
    /// Whether the status is final for scheduling purposes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Skipped
        )
    }

    /// Whether moving from `self` to `next` goes forward in the lifecycle.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => next != TaskStatus::Pending,
            TaskStatus::Running => matches!(
                next,
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Gate restricting whether a task runs, evaluated against prerequisite outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCondition {
    /// Run only if every listed task completed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<String>,
    /// Run only if at least one listed task failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,
}

impl TaskCondition {
    /// Condition requiring all `ids` to complete.
    pub fn on_success<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            on_success: ids.into_iter().map(Into::into).collect(),
            on_failure: Vec::new(),
        }
    }

    /// Condition requiring any of `ids` to fail.
    pub fn on_failure<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            on_success: Vec::new(),
            on_failure: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// True when neither set names a task.
    pub fn is_empty(&self) -> bool {
        self.on_success.is_empty() && self.on_failure.is_empty()
    }

    /// All task ids named by the condition.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &str> {
        self.on_success
            .iter()
            .chain(self.on_failure.iter())
            .map(String::as_str)
    }
}

/// A unit of work inside an [`ExecutionPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within the plan.
    pub id: String,
    /// Category of work.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// What to do, in free text.
    pub description: String,
    /// Lifecycle state. Set by the executor only.
    pub status: TaskStatus,
    /// Agent type that should run the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<AgentType>,
    /// Parameters for the agent.
    #[serde(default)]
    pub input: Payload,
    /// Result produced by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    /// Failure, skip or cancellation reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ids of tasks that must be processed first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Run condition over prerequisite outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<TaskCondition>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the task started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Pending task with no dependencies.
    pub fn new(
        id: impl Into<String>,
        task_type: impl Into<TaskType>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            assigned_agent: None,
            input: Payload::new(),
            output: None,
            error: None,
            dependencies: Vec::new(),
            condition: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// A task with a freshly generated UUID id.
    pub fn with_generated_id(
        task_type: impl Into<TaskType>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(Uuid::new_v4().to_string(), task_type, description)
    }

    /// Set the dependency ids.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Gate the task on prerequisite outcomes.
    pub fn with_condition(mut self, condition: TaskCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Pin the task to an agent type.
    pub fn assigned_to(mut self, agent: impl Into<AgentType>) -> Self {
        self.assigned_agent = Some(agent.into());
        self
    }

    /// Set the input payload.
    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    /// Whether every dependency and every task named by the condition is in
    /// `processed`.
    pub fn is_ready(&self, processed: &HashSet<String>) -> bool {
        self.referenced_ids().all(|id| processed.contains(id))
    }

    /// Every task id this task refers to, through dependencies or its condition.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .map(String::as_str)
            .chain(self.condition.iter().flat_map(TaskCondition::referenced_ids))
    }

    /// Move to `next` if that is a forward transition. Returns whether it moved.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        if next == TaskStatus::Running {
            self.started_at = Some(now);
        } else if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        true
    }

    /// Record a successful run.
    pub fn complete(&mut self, output: Option<Payload>) -> bool {
        let moved = self.transition(TaskStatus::Completed);
        if moved {
            self.output = output;
        }
        moved
    }

    /// Record a failure, skip or cancellation with its reason.
    pub fn finish_with_reason(&mut self, status: TaskStatus, reason: impl Into<String>) -> bool {
        let moved = self.transition(status);
        if moved {
            self.error = Some(reason.into());
        }
        moved
    }
}

/// How the tasks of a plan relate. Informational only; scheduling is always
/// dependency-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Tasks depend on each other.
    Sequential,
    /// Independent tasks only.
    Parallel,
    /// At least one task has a run condition.
    Conditional,
}

impl ExecutionMode {
    /// Classify a task list. Conditions dominate, then dependencies, then fan-out.
    pub fn infer(tasks: &[Task]) -> Self {
        if tasks.iter().any(|t| t.condition.is_some()) {
            ExecutionMode::Conditional
        } else if tasks.iter().any(|t| !t.dependencies.is_empty()) || tasks.len() <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel
        }
    }
}

/// An ordered set of tasks derived from one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Unique plan id.
    pub id: String,
    /// Id of the originating request.
    pub request_id: String,
    /// Tasks in plan order.
    pub tasks: Vec<Task>,
    /// Shape of the plan, for logging.
    pub execution_mode: ExecutionMode,
    /// Overall status.
    pub status: TaskStatus,
    /// Free-form metadata such as `intent` and `input`.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last change.
    pub updated_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Pending plan with a fresh id.
    pub fn new(request_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            execution_mode: ExecutionMode::infer(&tasks),
            tasks,
            status: TaskStatus::Pending,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// The intent recorded by the planner, if any.
    pub fn intent(&self) -> Option<&str> {
        self.metadata.get("intent").and_then(|v| v.as_str())
    }

    /// Number of tasks in each status.
    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in &self.tasks {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
