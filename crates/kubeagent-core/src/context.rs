use crate::conversation::Conversation;
use crate::task::Payload;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TASK_OUTPUT_PREFIX: &str = "task_output:";

/// Per-request carrier shared by every task of one plan run.
///
/// Share it as `Arc<AgentContext>`. The scratch space, the active plan id and
/// the conversation are each behind their own lock so concurrent tasks of a
/// round can touch them independently.
#[derive(Debug)]
pub struct AgentContext {
    /// Id of the request being served.
    pub request_id: String,
    /// User who sent the request.
    pub user_id: String,
    /// Correlation id for logs.
    pub trace_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    state: RwLock<HashMap<String, serde_json::Value>>,
    plan_id: RwLock<Option<String>>,
    conversation: Mutex<Conversation>,
    cancel: CancellationToken,
}

/// Serialisable copy of an [`AgentContext`], as persisted by a state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Id of the request being served.
    pub request_id: String,
    /// User who sent the request.
    pub user_id: String,
    /// Correlation id for logs.
    pub trace_id: String,
    /// Scratch space, including published task outputs.
    #[serde(default)]
    pub state: HashMap<String, serde_json::Value>,
    /// Active plan, if one was started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    /// Conversation history.
    #[serde(default)]
    pub conversation: Conversation,
    /// Creation time of the original context.
    pub created_at: DateTime<Utc>,
}

impl AgentContext {
    /// Context with explicit ids and an empty conversation.
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            trace_id: trace_id.into(),
            created_at: Utc::now(),
            state: RwLock::new(HashMap::new()),
            plan_id: RwLock::new(None),
            conversation: Mutex::new(Conversation::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Context for `request_id` with a fresh trace id.
    pub fn for_request(request_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(request_id, user_id, Uuid::new_v4().to_string())
    }

    /// Store a scratch value.
    pub fn set_state(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state.write().insert(key.into(), value);
    }

    /// Read a scratch value.
    pub fn get_state(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().get(key).cloned()
    }

    /// Publish a completed task's output so later tasks of the run can read it.
    pub fn record_task_output(&self, task_id: &str, output: &Payload) {
        self.set_state(
            format!("{TASK_OUTPUT_PREFIX}{task_id}"),
            serde_json::Value::Object(output.clone()),
        );
    }

    /// Output published by [`AgentContext::record_task_output`].
    pub fn task_output(&self, task_id: &str) -> Option<Payload> {
        match self.get_state(&format!("{TASK_OUTPUT_PREFIX}{task_id}")) {
            Some(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Record the active plan.
    pub fn set_plan_id(&self, plan_id: impl Into<String>) {
        *self.plan_id.write() = Some(plan_id.into());
    }

    /// The active plan, if any.
    pub fn plan_id(&self) -> Option<String> {
        self.plan_id.read().clone()
    }

    /// Run `f` with exclusive access to the conversation.
    pub fn with_conversation<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        f(&mut self.conversation.lock())
    }

    /// Request cancellation of the run. In-flight work is not interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`AgentContext::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A clone of the token, for wiring into `select!` or child contexts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serialisable copy of the current state.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            request_id: self.request_id.clone(),
            user_id: self.user_id.clone(),
            trace_id: self.trace_id.clone(),
            state: self.state.read().clone(),
            plan_id: self.plan_id(),
            conversation: self.conversation.lock().clone(),
            created_at: self.created_at,
        }
    }

    /// Rebuild a live context from a snapshot. The cancellation token is fresh.
    pub fn from_snapshot(snapshot: ContextSnapshot) -> Self {
        Self {
            request_id: snapshot.request_id,
            user_id: snapshot.user_id,
            trace_id: snapshot.trace_id,
            created_at: snapshot.created_at,
            state: RwLock::new(snapshot.state),
            plan_id: RwLock::new(snapshot.plan_id),
            conversation: Mutex::new(snapshot.conversation),
            cancel: CancellationToken::new(),
        }
    }
}
