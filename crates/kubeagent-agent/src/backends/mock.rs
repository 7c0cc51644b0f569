use super::LlmBackend;
use crate::llm::LlmResponse;
use async_trait::async_trait;
use kubeagent_core::{KubeAgentError, KubeAgentResult, Message, Tool};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Handler = dyn Fn(&[Message]) -> Result<String, String> + Send + Sync;

/// Deterministic in-process backend for tests and offline runs.
///
/// Replies come from a queue of scripted responses first, then from the
/// handler (by default a fixed "Mock response"). A handler error becomes
/// [`KubeAgentError::LlmUnavailable`].
pub struct MockBackend {
    scripted: Mutex<VecDeque<Result<String, String>>>,
    tool_responses: Mutex<VecDeque<LlmResponse>>,
    handler: Box<Handler>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockBackend {
    /// Backend that answers every call with "Mock response".
    pub fn new() -> Self {
        Self::from_fn(|_| Ok("Mock response".to_string()))
    }

    /// Answer every call through `f`, which sees the full message list.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            tool_responses: Mutex::new(VecDeque::new()),
            handler: Box::new(f),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer the first calls in order with `responses`.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        backend
            .scripted
            .lock()
            .extend(responses.into_iter().map(|r| Ok(r.into())));
        backend
    }

    /// Fail every call with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::from_fn(move |_| Err(reason.clone()))
    }

    /// Queue a response for the next `complete_with_tools` call.
    pub fn push_tool_response(&self, response: LlmResponse) {
        self.tool_responses.lock().push_back(response);
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every message list received so far, in call order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }

    fn next_text(&self, messages: &[Message]) -> KubeAgentResult<String> {
        self.calls.lock().push(messages.to_vec());
        let scripted = self.scripted.lock().pop_front();
        scripted
            .unwrap_or_else(|| (self.handler)(messages))
            .map_err(KubeAgentError::LlmUnavailable)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, messages: &[Message]) -> KubeAgentResult<String> {
        self.next_text(messages)
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[Arc<dyn Tool>],
    ) -> KubeAgentResult<LlmResponse> {
        let queued = self.tool_responses.lock().pop_front();
        if let Some(response) = queued {
            self.calls.lock().push(messages.to_vec());
            return Ok(response);
        }
        Ok(LlmResponse::text(self.next_text(messages)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let mock = MockBackend::with_responses(["first"]);
        let msgs = [Message::user("hi")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Mock response");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_maps_to_unavailable() {
        let mock = MockBackend::failing("model offline");
        let err = mock.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, KubeAgentError::LlmUnavailable(ref m) if m == "model offline"));
    }
}
