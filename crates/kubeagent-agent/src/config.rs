use kubeagent_core::{AgentType, KubeAgentError, KubeAgentResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Chat-completion providers speaking the OpenAI wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI's hosted API.
    OpenAi,
    /// OpenRouter's model gateway.
    OpenRouter,
    /// Groq cloud inference.
    Groq,
    /// A local Ollama server.
    Ollama,
}

/// Model selection and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider serving the model.
    pub provider: LlmProvider,
    /// Model name as the provider knows it.
    pub model_id: String,
    /// API key. Empty for providers that need none.
    #[serde(default)]
    pub api_key: String,
    /// Environment variable holding the key. Read by [`ModelConfig::resolve_api_key`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on tool-calling turns per agent invocation.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_turns() -> u32 {
    10
}

impl ModelConfig {
    /// Config with default sampling parameters.
    pub fn new(
        provider: LlmProvider,
        model_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            api_key: api_key.into(),
            api_key_env: None,
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_turns: default_max_turns(),
        }
    }

    /// Base URL up to and including the API version segment.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::OpenAi => "https://api.openai.com/v1",
                LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
                LlmProvider::Groq => "https://api.groq.com/openai/v1",
                LlmProvider::Ollama => "http://localhost:11434/v1",
            }
        }
    }

    /// Fill `api_key` from `api_key_env` when the key is not set inline.
    pub fn resolve_api_key(&mut self) -> KubeAgentResult<()> {
        if !self.api_key.is_empty() {
            return Ok(());
        }
        if let Some(var) = &self.api_key_env {
            self.api_key = std::env::var(var).map_err(|_| {
                KubeAgentError::Config(format!("environment variable {var} is not set"))
            })?;
        }
        Ok(())
    }
}

/// Identity and limits of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name.
    pub name: String,
    /// Capability tag used for dispatch.
    pub agent_type: AgentType,
    /// What the agent does.
    #[serde(default)]
    pub description: String,
    /// Retries for transient LLM failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-task time box in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Model override for this agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<ModelConfig>,
    /// Free-form extra settings.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    120
}

impl AgentConfig {
    /// Config with default retries and time box.
    pub fn new(
        name: impl Into<String>,
        agent_type: AgentType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            agent_type,
            description: description.into(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            llm: None,
            metadata: HashMap::new(),
        }
    }

    /// Defaults for the orchestrating agent: five minute time box.
    pub fn coordinator() -> Self {
        Self::new(
            "coordinator",
            AgentType::Coordinator,
            "Orchestrates multiple specialist agents",
        )
        .with_timeout(Duration::from_secs(300))
    }

    /// Set the per-task time box. Rounded down to whole seconds, at least one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Per-task time box.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
