use kubeagent_core::KubeAgentError;
use serde::{Deserialize, Serialize};

/// Retry behaviour for transient LLM failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Cap on a single delay.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Default backoff with the given retry count.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        delay.min(self.backoff_max_ms)
    }
}

/// Whether an error is transient: rate limits, server errors, timeouts and
/// connection failures. Client errors such as 400 are not retried.
pub fn is_retryable(err: &KubeAgentError) -> bool {
    let KubeAgentError::LlmUnavailable(msg) = err else {
        return false;
    };
    let lower = msg.to_lowercase();
    if lower.contains(" 400") {
        return false;
    }
    ["429", "500", "502", "503", "504", "timeout", "timed out", "connection"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 350,
        };
        assert_eq!(policy.backoff_ms(0), 100);
        assert_eq!(policy.backoff_ms(1), 200);
        assert_eq!(policy.backoff_ms(2), 350);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&KubeAgentError::LlmUnavailable(
            "OpenAI API error 503 Service Unavailable".into()
        )));
        assert!(is_retryable(&KubeAgentError::LlmUnavailable(
            "connection refused".into()
        )));
        assert!(!is_retryable(&KubeAgentError::LlmUnavailable(
            "OpenAI API error 400 Bad Request".into()
        )));
        assert!(!is_retryable(&KubeAgentError::LlmUnavailable(
            "model offline".into()
        )));
        assert!(!is_retryable(&KubeAgentError::Config("timeout".into())));
    }
}
