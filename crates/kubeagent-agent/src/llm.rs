use crate::backends::openai::OpenAiBackend;
use crate::backends::LlmBackend;
use crate::config::ModelConfig;
use kubeagent_core::{KubeAgentResult, Message, Tool, ToolCall};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Response from a tool-enabled completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Assistant text. May be empty when the model only called tools.
    pub content: String,
    /// Tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Provider finish reason, e.g. `stop` or `tool_calls`.
    pub finish_reason: String,
}

impl LlmResponse {
    /// A final text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
        }
    }

    /// A request to run tools.
    pub fn tool_use(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
            finish_reason: "tool_calls".to_string(),
        }
    }

    /// Whether the model requested any tool call.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Cheaply cloneable handle to an LLM backend.
///
/// Every provider in [`crate::LlmProvider`] speaks the OpenAI wire format, so
/// [`LlmClient::new`] always builds an [`OpenAiBackend`]. Custom backends go
/// through [`LlmClient::from_backend`].
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
}

impl LlmClient {
    /// Client over the OpenAI-compatible backend for `config`.
    pub fn new(config: ModelConfig) -> Self {
        Self::from_backend(Arc::new(OpenAiBackend::new(config)))
    }

    /// Create from a pre-built backend (mocks, custom providers).
    pub fn from_backend(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Plain chat completion.
    pub async fn complete(&self, messages: &[Message]) -> KubeAgentResult<String> {
        debug!(messages = messages.len(), "LLM completion");
        self.backend.complete(messages).await
    }

    /// Chat completion offering `tools` to the model.
    pub async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[Arc<dyn Tool>],
    ) -> KubeAgentResult<LlmResponse> {
        debug!(
            messages = messages.len(),
            tools = tools.len(),
            "LLM completion with tools"
        );
        self.backend.complete_with_tools(messages, tools).await
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient").finish_non_exhaustive()
    }
}
