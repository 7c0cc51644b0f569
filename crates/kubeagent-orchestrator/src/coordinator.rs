use crate::executor::{Executor, ExecutorConfig};
use crate::planner::Planner;
use crate::registry::AgentRegistry;
use async_trait::async_trait;
use kubeagent_agent::{Agent, AgentConfig, AgentMetrics, LlmClient, MetricsTracker};
use kubeagent_core::{
    AgentContext, AgentType, ExecutionPlan, KubeAgentError, KubeAgentResult, Request, Response,
    Task, TaskStatus, TaskType,
};
use kubeagent_store::StateStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Entry point of the engine: owns the worker registry, plans requests and
/// runs the resulting plans.
pub struct Coordinator {
    config: AgentConfig,
    llm: LlmClient,
    store: Arc<dyn StateStore>,
    registry: Arc<AgentRegistry>,
    planner: Planner,
    executor: Executor,
    metrics: MetricsTracker,
}

impl Coordinator {
    /// Coordinator with the default coordinator config.
    pub fn new(llm: LlmClient, store: Arc<dyn StateStore>) -> Self {
        Self::with_config(AgentConfig::coordinator(), llm, store)
    }

    /// Build with a custom config. Its timeout becomes the per-task time box.
    pub fn with_config(config: AgentConfig, llm: LlmClient, store: Arc<dyn StateStore>) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let executor_config = ExecutorConfig::default().with_task_timeout(config.timeout());
        let executor = Executor::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            llm.clone(),
            executor_config,
        );
        Self {
            planner: Planner::new(llm.clone(), Arc::clone(&store)),
            metrics: MetricsTracker::new(config.agent_type.clone()),
            config,
            llm,
            store,
            registry,
            executor,
        }
    }

    /// Replace the executor limits.
    pub fn with_executor_config(mut self, executor_config: ExecutorConfig) -> Self {
        self.executor = Executor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            self.llm.clone(),
            executor_config,
        );
        self
    }

    /// Register a specialist agent.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> KubeAgentResult<()> {
        self.registry.register(agent)
    }

    /// Look up a registered agent.
    pub fn get_agent(&self, agent_type: &AgentType) -> KubeAgentResult<Arc<dyn Agent>> {
        self.registry.get(agent_type)
    }

    /// The agent registry.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Limits applied when executing plans.
    pub fn executor_config(&self) -> &ExecutorConfig {
        self.executor.config()
    }

    /// Classify and decompose `request` into a plan.
    pub async fn plan(
        &self,
        ctx: &AgentContext,
        request: &Request,
    ) -> KubeAgentResult<ExecutionPlan> {
        self.planner.plan(ctx, request).await
    }

    /// Run `plan` to completion. Records one metrics sample per call.
    pub async fn execute_plan(
        &self,
        ctx: &Arc<AgentContext>,
        plan: &mut ExecutionPlan,
    ) -> KubeAgentResult<Response> {
        let started = Instant::now();
        let result = self.executor.run(ctx, plan).await;
        self.metrics.record(started.elapsed(), result.is_ok());
        result
    }

    /// Plan and run a request in a fresh context.
    pub async fn handle(&self, request: &Request) -> KubeAgentResult<Response> {
        let ctx = Arc::new(AgentContext::for_request(request.id.clone(), request.user.clone()));
        self.handle_with_context(&ctx, request).await
    }

    /// Plan and run a request in `ctx`, then save the context.
    ///
    /// The caller keeps `ctx` and may cancel it while the plan runs.
    pub async fn handle_with_context(
        &self,
        ctx: &Arc<AgentContext>,
        request: &Request,
    ) -> KubeAgentResult<Response> {
        ctx.with_conversation(|c| c.push_user(request.input.clone()));

        let mut plan = self.plan(ctx, request).await?;
        let response = self.execute_plan(ctx, &mut plan).await?;

        ctx.with_conversation(|c| c.push_assistant(response.result.clone()));
        if let Err(e) = self.store.save_context(&ctx.snapshot()).await {
            warn!(request_id = %request.id, error = %e, "Failed to save agent context");
        }

        info!(
            request_id = %request.id,
            status = %response.status,
            duration_ms = response.duration_ms,
            "Request handled"
        );
        Ok(response)
    }
}

#[async_trait]
impl Agent for Coordinator {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn can_handle(&self, _task_type: &TaskType) -> bool {
        true
    }

    /// Run a single task on the matching worker, owning its lifecycle.
    async fn execute(&self, ctx: &AgentContext, mut task: Task) -> KubeAgentResult<Task> {
        info!(task_id = %task.id, task_type = %task.task_type, "Executing task");

        task.transition(TaskStatus::Running);
        if let Err(e) = self.store.save_task(&task).await {
            warn!(task_id = %task.id, error = %e, "Failed to save task state");
        }

        let outcome = match self.registry.select_for(&task) {
            Ok(agent) => {
                tokio::time::timeout(self.config.timeout(), agent.execute(ctx, task.clone()))
                    .await
                    .unwrap_or_else(|_| {
                        Err(KubeAgentError::Timeout {
                            task_id: task.id.clone(),
                            timeout_ms: self.config.timeout().as_millis() as u64,
                        })
                    })
            }
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(done) => {
                task.complete(done.output);
                Ok(())
            }
            Err(e) => {
                task.finish_with_reason(TaskStatus::Failed, e.to_string());
                Err(e)
            }
        };

        if let Err(e) = self.store.save_task(&task).await {
            warn!(task_id = %task.id, error = %e, "Failed to save task state");
        }
        result.map(|()| task)
    }

    fn metrics(&self) -> Option<AgentMetrics> {
        Some(self.metrics.snapshot())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::StubAgent;
    use kubeagent_agent::MockBackend;
    use kubeagent_store::MemoryStateStore;

    fn coordinator(mock: MockBackend) -> (Coordinator, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let coordinator = Coordinator::new(
            LlmClient::from_backend(Arc::new(mock)),
            Arc::clone(&store) as Arc<dyn StateStore>,
        );
        (coordinator, store)
    }

    #[test]
    fn test_identity() {
        let (c, _) = coordinator(MockBackend::new());
        assert_eq!(c.agent_type(), AgentType::Coordinator);
        assert!(c.can_handle(&TaskType::Other("anything".into())));
        assert_eq!(c.executor_config().task_timeout.as_secs(), 300);
    }

    #[test]
    fn test_register_and_get_agent() {
        let (c, _) = coordinator(MockBackend::new());
        c.register_agent(
            StubAgent::new("diag", AgentType::Diagnostician, [TaskType::Diagnose]).into_arc(),
        )
        .unwrap();
        assert_eq!(c.get_agent(&AgentType::Diagnostician).unwrap().name(), "diag");
        assert!(matches!(
            c.get_agent(&AgentType::Security).err().unwrap(),
            KubeAgentError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_execute_single_task_sets_status() {
        let (c, store) = coordinator(MockBackend::new());
        c.register_agent(
            StubAgent::new("diag", AgentType::Diagnostician, [TaskType::Diagnose]).into_arc(),
        )
        .unwrap();
        let ctx = AgentContext::for_request("r", "u");

        let done = c
            .execute(&ctx, Task::new("t1", "diagnose", "x"))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.started_at.is_some());
        assert_eq!(
            store.load_task("t1").await.unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_execute_without_capable_agent_saves_failure() {
        let (c, store) = coordinator(MockBackend::new());
        let ctx = AgentContext::for_request("r", "u");
        let err = c
            .execute(&ctx, Task::new("t1", "optimize", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeAgentError::NoCapableAgent(_)));
        let saved = store.load_task("t1").await.unwrap();
        assert_eq!(saved.status, TaskStatus::Failed);
        assert!(saved.error.unwrap().contains("optimize"));
    }

    #[tokio::test]
    async fn test_handle_records_metrics_and_context() {
        let mock = MockBackend::with_responses([
            r#"[{"id":"q","type":"query","description":"list pods","dependencies":[]}]"#,
            "Listed the pods.",
        ]);
        let (c, store) = coordinator(mock);
        c.register_agent(
            StubAgent::new("diag", AgentType::Diagnostician, [TaskType::Query]).into_arc(),
        )
        .unwrap();

        let request = Request::new("ops", "list pods").with_intent("query");
        let response = c.handle(&request).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.result, "Listed the pods.");

        let metrics = c.metrics().unwrap();
        assert_eq!(metrics.tasks_completed, 1);

        let snapshot = store.load_context(&request.id).await.unwrap();
        assert_eq!(snapshot.conversation.len(), 2);
        assert!(snapshot.plan_id.is_some());
    }

    #[tokio::test]
    async fn test_structural_failure_counts_as_failed_run() {
        let (c, _) = coordinator(MockBackend::new());
        let ctx = Arc::new(AgentContext::for_request("r", "u"));
        let mut plan = ExecutionPlan::new(
            "r",
            vec![Task::new("a", "query", "a").with_dependencies(["missing"])],
        );
        assert!(c.execute_plan(&ctx, &mut plan).await.is_err());
        assert_eq!(c.metrics().unwrap().tasks_failed, 1);
    }
}
