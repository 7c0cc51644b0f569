/// Scripted backend for tests.
pub mod mock;
/// OpenAI-compatible HTTP backend.
pub mod openai;

use crate::llm::LlmResponse;
use async_trait::async_trait;
use kubeagent_core::{KubeAgentResult, Message, Tool};
use std::sync::Arc;

/// Trait for LLM provider backends.
///
/// Implementations map transport, authentication and protocol failures to
/// [`kubeagent_core::KubeAgentError::LlmUnavailable`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Plain chat completion. Returns the assistant text.
    async fn complete(&self, messages: &[Message]) -> KubeAgentResult<String>;

    /// Chat completion with tools the model may call.
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[Arc<dyn Tool>],
    ) -> KubeAgentResult<LlmResponse>;
}
