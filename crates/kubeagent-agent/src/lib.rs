//! Agent layer for the KubeAgent orchestration engine.
//!
//! Provides the [`Agent`] worker contract, the [`BaseAgent`] plumbing shared
//! by LLM-backed workers, the LLM collaborator ([`LlmBackend`], [`LlmClient`])
//! with an OpenAI-compatible HTTP backend, per-agent [`MetricsTracker`]s and
//! the built-in [`specialists`].

/// Agent trait and shared base implementation.
pub mod agent;
/// LLM provider backends.
pub mod backends;
/// Model and agent configuration.
pub mod config;
/// LLM client handle and response type.
pub mod llm;
/// Per-agent execution metrics.
pub mod metrics;
/// Helpers for reading JSON out of model replies.
pub mod parse;
/// Retry policy for transient LLM failures.
pub mod retry;
/// Built-in specialist workers.
pub mod specialists;

pub use agent::{Agent, BaseAgent, Specialist};
pub use backends::mock::MockBackend;
pub use backends::openai::OpenAiBackend;
pub use backends::LlmBackend;
pub use config::{AgentConfig, LlmProvider, ModelConfig};
pub use llm::{LlmClient, LlmResponse};
pub use metrics::{AgentMetrics, MetricsTracker};
pub use retry::RetryPolicy;
pub use specialists::{Diagnostician, Remediator};
