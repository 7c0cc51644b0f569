//! Core types and error definitions for the KubeAgent orchestration engine.
//!
//! This crate provides the foundational types shared across all KubeAgent crates:
//! the error taxonomy, conversation messages, the tool contract, and the
//! task/plan data model that the scheduler operates on.
//!
//! # Main types
//!
//! - [`KubeAgentError`]: Unified error enum for all KubeAgent subsystems.
//! - [`KubeAgentResult`]: Convenience alias for `Result<T, KubeAgentError>`.
//! - [`Message`] / [`Conversation`]: Conversation state passed to every LLM call.
//! - [`Task`] / [`ExecutionPlan`]: Units of work and their dependency graph.
//! - [`AgentContext`]: Per-request carrier shared by every task of one plan run.
//! - [`Tool`] / [`ToolRegistry`]: Tools that specialist agents can invoke.

/// Per-request execution context.
pub mod context;
/// Explicit conversation state.
pub mod conversation;
/// Request and response envelopes.
pub mod request;
/// Task, condition and execution plan model.
pub mod task;
/// Tool contract and registry.
pub mod tool;

pub use context::{AgentContext, ContextSnapshot};
pub use conversation::Conversation;
pub use request::{Request, Response};
pub use task::{
    AgentType, ExecutionMode, ExecutionPlan, Payload, Task, TaskCondition, TaskStatus, TaskType,
};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for KubeAgent.
///
/// Structural variants (see [`KubeAgentError::is_structural`]) describe a
/// malformed plan and abort the whole run; every other variant is scoped to a
/// single task, lookup or collaborator call.
#[derive(Debug, thiserror::Error)]
pub enum KubeAgentError {
    /// An agent of the same capability type is already registered.
    #[error("agent of type {0} already registered")]
    DuplicateAgent(String),

    /// The agent cannot be registered as a worker.
    #[error("invalid agent: {0}")]
    InvalidAgent(String),

    /// A lookup (agent, task, plan, context) found nothing.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up (`agent`, `task`, `plan`, `context`).
        kind: &'static str,
        /// The key that missed.
        id: String,
    },

    /// No registered agent declares the capability for this task type.
    #[error("no agent available to handle task type: {0}")]
    NoCapableAgent(String),

    /// A task references an id that is not part of the plan.
    #[error("task {task_id} has invalid dependency: {missing_id} (task not found)")]
    DanglingDependency {
        /// The task holding the reference.
        task_id: String,
        /// The id that does not exist.
        missing_id: String,
    },

    /// The dependency relation contains a cycle through this task.
    #[error("circular dependency detected in task: {0}")]
    CyclicDependency(String),

    /// Two tasks of one plan share an id.
    #[error("duplicate task id in plan: {0}")]
    DuplicateTask(String),

    /// Unprocessed tasks remain but none is ready.
    #[error("no tasks ready to execute, but {remaining} tasks remaining")]
    SchedulingDeadlock {
        /// Number of tasks that were never processed.
        remaining: usize,
    },

    /// The language-model collaborator could not be reached or refused the call.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// The decomposition response was not the expected JSON task array.
    #[error("failed to parse task decomposition: {0}")]
    DecompositionParseFailure(String),

    /// An agent failed while executing a task.
    #[error("task {task_id} failed: {reason}")]
    TaskExecution {
        /// The failed task.
        task_id: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A task exceeded its time box.
    #[error("task {task_id} timed out after {timeout_ms} ms")]
    Timeout {
        /// The task that was cut off.
        task_id: String,
        /// The configured limit.
        timeout_ms: u64,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A state store backend error.
    #[error("Store error: {0}")]
    Store(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubeAgentError {
    /// Shorthand for [`KubeAgentError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this error means the plan itself is malformed.
    ///
    /// Structural errors abort the run and are never retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DanglingDependency { .. }
                | Self::CyclicDependency(_)
                | Self::DuplicateTask(_)
                | Self::SchedulingDeadlock { .. }
        )
    }
}

/// A convenience `Result` alias using [`KubeAgentError`].
pub type KubeAgentResult<T> = Result<T, KubeAgentError>;

// --- Message types ---

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The language model.
    Assistant,
    /// A system-level instruction.
    System,
    /// Output produced by a tool invocation.
    Tool,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// A single message exchanged with the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// For [`Role::Tool`] messages, the tool call this answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary key-value metadata attached to the message.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a [`Role::Tool`] message answering `call_id`.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(call_id.into());
        msg
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors() {
        assert!(KubeAgentError::CyclicDependency("a".into()).is_structural());
        assert!(KubeAgentError::DanglingDependency {
            task_id: "a".into(),
            missing_id: "b".into()
        }
        .is_structural());
        assert!(KubeAgentError::SchedulingDeadlock { remaining: 2 }.is_structural());
        assert!(!KubeAgentError::NoCapableAgent("audit".into()).is_structural());
        assert!(!KubeAgentError::LlmUnavailable("down".into()).is_structural());
    }

    #[test]
    fn test_error_display() {
        let err = KubeAgentError::DanglingDependency {
            task_id: "T1".into(),
            missing_id: "ghost".into(),
        };
        assert_eq!(
            err.to_string(),
            "task T1 has invalid dependency: ghost (task not found)"
        );
        assert_eq!(
            KubeAgentError::not_found("plan", "p-1").to_string(),
            "plan not found: p-1"
        );
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let msg = Message::tool("call_1", "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }
}
