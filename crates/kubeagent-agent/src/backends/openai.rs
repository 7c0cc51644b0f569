use super::LlmBackend;
use crate::config::{LlmProvider, ModelConfig};
use crate::llm::LlmResponse;
use async_trait::async_trait;
use kubeagent_core::{KubeAgentError, KubeAgentResult, Message, Role, Tool, ToolCall};
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata key under which an assistant message keeps the tool calls it made.
pub const TOOL_CALLS_METADATA_KEY: &str = "tool_calls";

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Build a backend with its own HTTP client.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                let mut msg = serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                });
                if m.role == Role::Tool {
                    if let Some(call_id) = &m.tool_call_id {
                        msg["tool_call_id"] = serde_json::json!(call_id);
                    }
                }
                if m.role == Role::Assistant {
                    if let Some(calls) = m.metadata.get(TOOL_CALLS_METADATA_KEY) {
                        msg["tool_calls"] = wire_tool_calls(calls);
                    }
                }
                msg
            })
            .collect()
    }

    fn build_tools(&self, tools: &[Arc<dyn Tool>]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                let parameters: serde_json::Value = serde_json::from_str(t.args_schema())
                    .unwrap_or_else(|e| {
                        warn!(
                            tool = %t.name(),
                            error = %e,
                            "Invalid tool schema, sending empty object schema"
                        );
                        serde_json::json!({"type": "object"})
                    });
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": parameters,
                    }
                })
            })
            .collect()
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        let request = if self.config.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        };

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "KubeAgent")
        } else {
            request
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[Arc<dyn Tool>],
    ) -> KubeAgentResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "messages": self.build_messages(messages),
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(self.build_tools(tools));
        }

        debug!(
            url = %url,
            model = %self.config.model_id,
            messages = messages.len(),
            "Sending chat completion"
        );

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| KubeAgentError::LlmUnavailable(format!("connection error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(KubeAgentError::LlmUnavailable(format!(
                "OpenAI API error {status}: {error_body}"
            )));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| KubeAgentError::LlmUnavailable(format!("invalid response body: {e}")))?;

        parse_openai_response(&resp_body)
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, messages: &[Message]) -> KubeAgentResult<String> {
        Ok(self.chat(messages, &[]).await?.content)
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[Arc<dyn Tool>],
    ) -> KubeAgentResult<LlmResponse> {
        self.chat(messages, tools).await
    }
}

/// Convert stored [`ToolCall`]s back into the OpenAI `tool_calls` shape.
fn wire_tool_calls(calls: &serde_json::Value) -> serde_json::Value {
    let calls: Vec<ToolCall> = serde_json::from_value(calls.clone()).unwrap_or_default();
    serde_json::Value::Array(
        calls
            .into_iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "type": "function",
                    "function": {
                        "name": c.name,
                        "arguments": c.arguments.to_string(),
                    }
                })
            })
            .collect(),
    )
}

/// Parse a chat completions response body into an [`LlmResponse`].
pub fn parse_openai_response(body: &serde_json::Value) -> KubeAgentResult<LlmResponse> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| KubeAgentError::LlmUnavailable("no choices returned".to_string()))?;
    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();
    let finish_reason = choice["finish_reason"]
        .as_str()
        .unwrap_or("stop")
        .to_string();

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let id = tc["id"].as_str()?.to_string();
                    let name = tc["function"]["name"].as_str()?.to_string();
                    let arguments = match &tc["function"]["arguments"] {
                        serde_json::Value::String(raw) => {
                            serde_json::from_str(raw).unwrap_or_default()
                        }
                        other => other.clone(),
                    };
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(LlmResponse {
        content,
        tool_calls,
        finish_reason,
    })
}
