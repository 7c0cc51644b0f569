//! `kubeagent.toml` loading.

use anyhow::Context;
use kubeagent_agent::ModelConfig;
use kubeagent_orchestrator::ExecutorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct KubeAgentConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub executor: ExecutorSection,
    /// Directory for the JSON state store. In-memory when absent.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default)]
    pub max_parallel: Option<usize>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            task_timeout_secs: default_task_timeout_secs(),
            max_parallel: None,
        }
    }
}

fn default_task_timeout_secs() -> u64 {
    300
}

impl ExecutorSection {
    pub fn to_executor_config(&self) -> ExecutorConfig {
        let config = ExecutorConfig::default()
            .with_task_timeout(Duration::from_secs(self.task_timeout_secs.max(1)));
        match self.max_parallel {
            Some(n) => config.with_max_parallel(n),
            None => config,
        }
    }
}

impl KubeAgentConfig {
    /// Parse TOML and resolve `api_key_env` from the environment.
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.model.resolve_api_key()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file '{}'", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use kubeagent_agent::LlmProvider;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = KubeAgentConfig::from_toml(
            r#"
            [model]
            provider = "ollama"
            model_id = "llama3.1"
            "#,
        )
        .unwrap();
        assert_eq!(config.model.provider, LlmProvider::Ollama);
        assert_eq!(config.executor.task_timeout_secs, 300);
        assert!(config.executor.max_parallel.is_none());
        assert!(config.data_dir.is_none());
        assert_eq!(
            config.executor.to_executor_config().task_timeout,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_full_config() {
        let config = KubeAgentConfig::from_toml(
            r#"
            data_dir = "/var/lib/kubeagent"

            [model]
            provider = "openai"
            model_id = "gpt-4o-mini"
            api_key = "sk-inline"
            temperature = 0.2

            [executor]
            task_timeout_secs = 45
            max_parallel = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.model.api_key, "sk-inline");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/kubeagent")));
        let executor = config.executor.to_executor_config();
        assert_eq!(executor.task_timeout, Duration::from_secs(45));
        assert_eq!(executor.max_parallel, Some(4));
    }

    #[test]
    fn test_missing_env_key_is_an_error() {
        let err = KubeAgentConfig::from_toml(
            r#"
            [model]
            provider = "groq"
            model_id = "llama-3.1-8b-instant"
            api_key_env = "KUBEAGENT_TEST_UNSET_KEY_VAR"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("KUBEAGENT_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn test_missing_model_section_rejected() {
        assert!(KubeAgentConfig::from_toml("data_dir = \"./data\"").is_err());
    }

    #[tokio::test]
    async fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = KubeAgentConfig::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
