use crate::condition::{self, Gate};
use crate::registry::AgentRegistry;
use crate::validator;
use chrono::Utc;
use kubeagent_agent::{AgentConfig, LlmClient};
use kubeagent_core::{
    AgentContext, AgentType, ExecutionPlan, KubeAgentError, KubeAgentResult, Message, Payload,
    Response, Task, TaskStatus,
};
use kubeagent_store::StateStore;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful Kubernetes assistant. Summarize task results clearly.";

/// Limits applied while running a plan.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Time box for a single agent call.
    pub task_timeout: Duration,
    /// Maximum number of tasks running at once within a round. `None` runs
    /// the whole frontier together.
    pub max_parallel: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_timeout: AgentConfig::coordinator().timeout(),
            max_parallel: None,
        }
    }
}

impl ExecutorConfig {
    /// Set the per-task time box.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Cap concurrent tasks per round. Zero is treated as one.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = Some(max_parallel.max(1));
        self
    }
}

/// Accumulators shared by the task units of one run.
#[derive(Default)]
struct RunState {
    statuses: HashMap<String, TaskStatus>,
    processed: HashSet<String>,
    data: HashMap<String, Payload>,
    errors: Vec<String>,
    executed_by: Vec<AgentType>,
    skipped: usize,
}

impl RunState {
    fn new<'a>(tasks: impl Iterator<Item = &'a Task>) -> Self {
        Self {
            statuses: tasks.map(|t| (t.id.clone(), t.status)).collect(),
            ..Self::default()
        }
    }

    /// Mark `task` processed and fold its outcome into the results.
    fn record(&mut self, task: &Task, agent_type: Option<AgentType>) {
        self.statuses.insert(task.id.clone(), task.status);
        self.processed.insert(task.id.clone());
        match task.status {
            TaskStatus::Completed => {
                if let Some(output) = &task.output {
                    self.data.insert(task.id.clone(), output.clone());
                }
                self.executed_by.extend(agent_type);
            }
            TaskStatus::Failed => self.errors.push(format!(
                "Task {} failed: {}",
                task.id,
                task.error.as_deref().unwrap_or("unknown error")
            )),
            TaskStatus::Skipped => self.skipped += 1,
            _ => {}
        }
    }
}

/// Runs validated plans round by round.
///
/// Each round takes every unprocessed task whose dependencies and condition
/// tasks are all processed and runs them concurrently; the next round starts once all of
/// them have finished. Failures are confined to the task that failed.
pub struct Executor {
    registry: Arc<AgentRegistry>,
    store: Arc<dyn StateStore>,
    llm: LlmClient,
    config: ExecutorConfig,
}

impl Executor {
    /// Executor dispatching through `registry`.
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: Arc<dyn StateStore>,
        llm: LlmClient,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            llm,
            config,
        }
    }

    /// Limits in effect.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every task of `plan` and aggregate the outcome.
    ///
    /// Structural problems (invalid graph, deadlock) return an error and
    /// leave the plan `failed`. Everything else is reported in the response.
    pub async fn run(
        &self,
        ctx: &Arc<AgentContext>,
        plan: &mut ExecutionPlan,
    ) -> KubeAgentResult<Response> {
        let started = Instant::now();

        if let Err(e) = validator::validate(&plan.tasks) {
            error!(plan_id = %plan.id, error = %e, "Invalid task dependencies");
            self.fail_plan(plan).await;
            return Err(e);
        }

        ctx.set_plan_id(plan.id.clone());
        plan.status = TaskStatus::Running;
        plan.touch();
        save_plan(self.store.as_ref(), plan).await;

        info!(
            plan_id = %plan.id,
            task_count = plan.tasks.len(),
            execution_mode = ?plan.execution_mode,
            "Executing plan"
        );

        let order: Vec<String> = plan.tasks.iter().map(|t| t.id.clone()).collect();
        let state = Arc::new(Mutex::new(RunState::new(plan.tasks.iter())));
        let mut waiting: HashMap<String, Task> =
            plan.tasks.drain(..).map(|t| (t.id.clone(), t)).collect();
        let mut finished: HashMap<String, Task> = HashMap::with_capacity(order.len());
        let semaphore = self
            .config
            .max_parallel
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut rounds = 0usize;
        let mut cancelled = false;

        while !waiting.is_empty() {
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }

            let processed = state.lock().processed.clone();
            let ready_ids = match ready_frontier(&order, &waiting, &processed) {
                Ok(ids) => ids,
                Err(e) => {
                    error!(plan_id = %plan.id, error = %e, "Scheduling stalled");
                    plan.tasks = reassemble(&order, &mut finished, &mut waiting);
                    self.fail_plan(plan).await;
                    return Err(e);
                }
            };

            rounds += 1;
            debug!(plan_id = %plan.id, round = rounds, ready = ready_ids.len(), "Starting round");

            let mut units = JoinSet::new();
            let mut in_flight: HashMap<String, Task> = HashMap::with_capacity(ready_ids.len());
            for id in &ready_ids {
                let Some(task) = waiting.remove(id) else {
                    continue;
                };
                let unit = TaskUnit {
                    registry: Arc::clone(&self.registry),
                    store: Arc::clone(&self.store),
                    ctx: Arc::clone(ctx),
                    state: Arc::clone(&state),
                    timeout: self.config.task_timeout,
                    semaphore: semaphore.clone(),
                };
                in_flight.insert(id.clone(), task.clone());
                units.spawn(unit.run(task));
            }

            while let Some(joined) = units.join_next().await {
                match joined {
                    Ok(task) => {
                        in_flight.remove(&task.id);
                        finished.insert(task.id.clone(), task);
                    }
                    Err(e) => error!(plan_id = %plan.id, error = %e, "Task unit aborted"),
                }
            }

            // Units that panicked never handed their task back.
            for (id, mut task) in in_flight {
                task.finish_with_reason(TaskStatus::Failed, "task aborted unexpectedly");
                save_task(self.store.as_ref(), &task).await;
                state.lock().record(&task, None);
                finished.insert(id, task);
            }
        }

        if cancelled {
            warn!(plan_id = %plan.id, remaining = waiting.len(), "Run cancelled");
            for id in &order {
                if let Some(mut task) = waiting.remove(id) {
                    task.finish_with_reason(
                        TaskStatus::Cancelled,
                        "run cancelled before the task started",
                    );
                    save_task(self.store.as_ref(), &task).await;
                    state.lock().record(&task, None);
                    finished.insert(id.clone(), task);
                }
            }
        }

        plan.tasks = reassemble(&order, &mut finished, &mut waiting);
        let RunState {
            data,
            errors,
            executed_by,
            skipped,
            ..
        } = std::mem::take(&mut *state.lock());

        let failed = plan
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        plan.status = if cancelled {
            TaskStatus::Cancelled
        } else if failed > 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };
        plan.touch();
        save_plan(self.store.as_ref(), plan).await;

        info!(
            plan_id = %plan.id,
            status = %plan.status,
            completed = data.len(),
            failed,
            skipped,
            rounds,
            "Plan finished"
        );

        let result = if cancelled {
            fallback_summary(plan.tasks.len())
        } else {
            self.summarize(plan, &data).await
        };

        Ok(Response {
            request_id: plan.request_id.clone(),
            status: plan.status,
            result,
            data,
            errors,
            executed_by,
            duration_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        })
    }

    async fn fail_plan(&self, plan: &mut ExecutionPlan) {
        plan.status = TaskStatus::Failed;
        plan.touch();
        save_plan(self.store.as_ref(), plan).await;
    }

    async fn summarize(&self, plan: &ExecutionPlan, data: &HashMap<String, Payload>) -> String {
        let ordered: BTreeMap<&String, &Payload> = data.iter().collect();
        let results = serde_json::to_string_pretty(&ordered).unwrap_or_else(|_| "{}".to_string());
        let request = plan
            .metadata
            .get("input")
            .and_then(|v| v.as_str())
            .unwrap_or(&plan.request_id);
        let prompt = format!(
            "Summarize the following task execution results for the user.\n\n\
             Original Request: {request}\n\n\
             Task Results:\n{results}\n\n\
             Provide a clear, concise summary of what was done and any important findings."
        );

        match self
            .llm
            .complete(&[Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(prompt)])
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(plan_id = %plan.id, error = %e, "Failed to generate final response with LLM");
                fallback_summary(plan.tasks.len())
            }
        }
    }
}

/// One ready task of the current round.
struct TaskUnit {
    registry: Arc<AgentRegistry>,
    store: Arc<dyn StateStore>,
    ctx: Arc<AgentContext>,
    state: Arc<Mutex<RunState>>,
    timeout: Duration,
    semaphore: Option<Arc<Semaphore>>,
}

impl TaskUnit {
    async fn run(self, mut task: Task) -> Task {
        let _permit = match &self.semaphore {
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        };

        let gate = condition::evaluate(&task, &self.state.lock().statuses);
        if let Gate::Skip(reason) = gate {
            info!(task_id = %task.id, reason = %reason, "Task skipped due to condition");
            task.finish_with_reason(TaskStatus::Skipped, reason);
            save_task(self.store.as_ref(), &task).await;
            self.state.lock().record(&task, None);
            return task;
        }

        task.transition(TaskStatus::Running);
        self.state
            .lock()
            .statuses
            .insert(task.id.clone(), TaskStatus::Running);
        save_task(self.store.as_ref(), &task).await;

        let agent_type = match self.dispatch(&mut task).await {
            Ok(agent_type) => Some(agent_type),
            Err(e) => {
                let reason = failure_reason(e);
                warn!(task_id = %task.id, error = %reason, "Task failed");
                task.finish_with_reason(TaskStatus::Failed, reason);
                None
            }
        };

        save_task(self.store.as_ref(), &task).await;
        self.state.lock().record(&task, agent_type);
        task
    }

    async fn dispatch(&self, task: &mut Task) -> KubeAgentResult<AgentType> {
        let agent = self.registry.select_for(task)?;
        let agent_type = agent.agent_type();
        info!(task_id = %task.id, agent_type = %agent_type, "Executing task");

        let done = tokio::time::timeout(self.timeout, agent.execute(&self.ctx, task.clone()))
            .await
            .map_err(|_| KubeAgentError::Timeout {
                task_id: task.id.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if let Some(output) = &done.output {
            self.ctx.record_task_output(&task.id, output);
        }
        task.complete(done.output);
        info!(task_id = %task.id, agent_type = %agent_type, "Task completed");
        Ok(agent_type)
    }
}

/// Ids of unprocessed tasks whose dependencies are all processed, in plan order.
fn ready_frontier(
    order: &[String],
    waiting: &HashMap<String, Task>,
    processed: &HashSet<String>,
) -> KubeAgentResult<Vec<String>> {
    let ready: Vec<String> = order
        .iter()
        .filter(|id| waiting.get(*id).is_some_and(|t| t.is_ready(processed)))
        .cloned()
        .collect();
    if ready.is_empty() && !waiting.is_empty() {
        return Err(KubeAgentError::SchedulingDeadlock {
            remaining: waiting.len(),
        });
    }
    Ok(ready)
}

fn reassemble(
    order: &[String],
    finished: &mut HashMap<String, Task>,
    waiting: &mut HashMap<String, Task>,
) -> Vec<Task> {
    order
        .iter()
        .filter_map(|id| finished.remove(id).or_else(|| waiting.remove(id)))
        .collect()
}

fn failure_reason(err: KubeAgentError) -> String {
    match err {
        KubeAgentError::TaskExecution { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn fallback_summary(task_count: usize) -> String {
    format!("Executed {task_count} tasks. Check detailed results in the data field.")
}

async fn save_task(store: &dyn StateStore, task: &Task) {
    if let Err(e) = store.save_task(task).await {
        warn!(task_id = %task.id, error = %e, "Failed to save task state");
    }
}

async fn save_plan(store: &dyn StateStore, plan: &ExecutionPlan) {
    if let Err(e) = store.save_plan(plan).await {
        warn!(plan_id = %plan.id, error = %e, "Failed to save plan");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::StubAgent;
    use kubeagent_agent::MockBackend;
    use kubeagent_core::{TaskCondition, TaskType};
    use kubeagent_store::MemoryStateStore;

    struct Fixture {
        executor: Executor,
        store: Arc<MemoryStateStore>,
        llm: Arc<MockBackend>,
    }

    fn fixture(agents: Vec<Arc<dyn kubeagent_agent::Agent>>, config: ExecutorConfig) -> Fixture {
        let registry = Arc::new(AgentRegistry::new());
        for agent in agents {
            registry.register(agent).unwrap();
        }
        let store = Arc::new(MemoryStateStore::new());
        let llm = Arc::new(MockBackend::with_responses(["All done."]));
        let executor = Executor::new(
            registry,
            Arc::clone(&store) as Arc<dyn StateStore>,
            LlmClient::from_backend(Arc::clone(&llm) as Arc<dyn kubeagent_agent::LlmBackend>),
            config,
        );
        Fixture {
            executor,
            store,
            llm,
        }
    }

    fn diag_agent() -> StubAgent {
        StubAgent::new(
            "diag",
            AgentType::Diagnostician,
            [TaskType::Diagnose, TaskType::Query],
        )
    }

    fn ctx() -> Arc<AgentContext> {
        Arc::new(AgentContext::for_request("req-1", "ops"))
    }

    #[tokio::test]
    async fn test_linear_chain_completes() {
        let f = fixture(vec![diag_agent().into_arc()], ExecutorConfig::default());
        let mut plan = ExecutionPlan::new(
            "req-1",
            vec![
                Task::new("a", "diagnose", "a"),
                Task::new("b", "diagnose", "b").with_dependencies(["a"]),
            ],
        );
        let resp = f.executor.run(&ctx(), &mut plan).await.unwrap();

        assert_eq!(resp.status, TaskStatus::Completed);
        assert_eq!(resp.result, "All done.");
        assert_eq!(resp.data.len(), 2);
        assert_eq!(resp.executed_by, vec![AgentType::Diagnostician; 2]);
        assert!(resp.errors.is_empty());
        assert_eq!(plan.status, TaskStatus::Completed);
        assert!(plan.tasks.iter().all(|t| t.completed_at.is_some()));
        assert_eq!(f.store.all_tasks().len(), 2);
        assert_eq!(f.llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_reported() {
        let f = fixture(
            vec![diag_agent().failing_on(&["a"]).into_arc()],
            ExecutorConfig::default(),
        );
        let mut plan = ExecutionPlan::new(
            "req-1",
            vec![
                Task::new("a", "diagnose", "a"),
                Task::new("b", "diagnose", "b"),
            ],
        );
        let resp = f.executor.run(&ctx(), &mut plan).await.unwrap();

        assert_eq!(resp.status, TaskStatus::Failed);
        assert_eq!(resp.errors, vec!["Task a failed: stub failure".to_string()]);
        assert!(resp.data.contains_key("b"));
        assert_eq!(plan.task("a").unwrap().status, TaskStatus::Failed);
        assert_eq!(plan.task("b").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_no_capable_agent_fails_task_only() {
        let f = fixture(vec![diag_agent().into_arc()], ExecutorConfig::default());
        let mut plan = ExecutionPlan::new(
            "req-1",
            vec![
                Task::new("scan", "audit", "rbac"),
                Task::new("q", "query", "pods"),
            ],
        );
        let resp = f.executor.run(&ctx(), &mut plan).await.unwrap();
        assert_eq!(resp.errors.len(), 1);
        assert!(resp.errors[0].contains("no agent available to handle task type: audit"));
        assert_eq!(plan.task("q").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_skip_is_not_an_error() {
        let f = fixture(
            vec![diag_agent().failing_on(&["a"]).into_arc()],
            ExecutorConfig::default(),
        );
        let mut plan = ExecutionPlan::new(
            "req-1",
            vec![
                Task::new("a", "diagnose", "a"),
                Task::new("b", "diagnose", "b")
                    .with_dependencies(["a"])
                    .with_condition(TaskCondition::on_success(["a"])),
            ],
        );
        let resp = f.executor.run(&ctx(), &mut plan).await.unwrap();

        let b = plan.task("b").unwrap();
        assert_eq!(b.status, TaskStatus::Skipped);
        assert_eq!(
            b.error.as_deref(),
            Some("condition not met: task a did not succeed (status: failed)")
        );
        assert_eq!(resp.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_condition_ids_wait_without_dependencies() {
        let agent = Arc::new(
            diag_agent()
                .failing_on(&["a"])
                .with_delay(Duration::from_millis(20)),
        );
        let f = fixture(
            vec![agent.clone() as Arc<dyn kubeagent_agent::Agent>],
            ExecutorConfig::default(),
        );
        let mut plan = ExecutionPlan::new(
            "req-1",
            vec![
                Task::new("a", "diagnose", "a"),
                Task::new("fallback", "diagnose", "fallback")
                    .with_condition(TaskCondition::on_failure(["a"])),
                Task::new("follow_up", "diagnose", "follow up")
                    .with_condition(TaskCondition::on_success(["a"])),
            ],
        );
        let resp = f.executor.run(&ctx(), &mut plan).await.unwrap();

        assert_eq!(plan.task("a").unwrap().status, TaskStatus::Failed);
        assert_eq!(plan.task("fallback").unwrap().status, TaskStatus::Completed);
        let follow_up = plan.task("follow_up").unwrap();
        assert_eq!(follow_up.status, TaskStatus::Skipped);
        assert_eq!(
            follow_up.error.as_deref(),
            Some("condition not met: task a did not succeed (status: failed)")
        );
        assert_eq!(resp.errors.len(), 1);
        assert_eq!(agent.seen(), vec!["a".to_string(), "fallback".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_plan_is_rejected_before_running() {
        let agent = Arc::new(diag_agent());
        let f = fixture(
            vec![agent.clone() as Arc<dyn kubeagent_agent::Agent>],
            ExecutorConfig::default(),
        );
        let mut plan = ExecutionPlan::new(
            "req-1",
            vec![
                Task::new("a", "diagnose", "a").with_dependencies(["b"]),
                Task::new("b", "diagnose", "b").with_dependencies(["a"]),
            ],
        );
        let err = f.executor.run(&ctx(), &mut plan).await.unwrap_err();
        assert!(matches!(err, KubeAgentError::CyclicDependency(_)));
        assert_eq!(plan.status, TaskStatus::Failed);
        assert!(agent.seen().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_fails_task() {
        let slow = diag_agent().with_delay(Duration::from_millis(500));
        let f = fixture(
            vec![slow.into_arc()],
            ExecutorConfig::default().with_task_timeout(Duration::from_millis(20)),
        );
        let mut plan = ExecutionPlan::new("req-1", vec![Task::new("slow", "diagnose", "x")]);
        let resp = f.executor.run(&ctx(), &mut plan).await.unwrap();
        assert_eq!(resp.status, TaskStatus::Failed);
        assert!(resp.errors[0].contains("timed out after 20 ms"));
    }

    #[tokio::test]
    async fn test_cancelled_context_cancels_remaining() {
        let f = fixture(vec![diag_agent().into_arc()], ExecutorConfig::default());
        let ctx = ctx();
        ctx.cancel();
        let mut plan = ExecutionPlan::new(
            "req-1",
            vec![
                Task::new("a", "diagnose", "a"),
                Task::new("b", "diagnose", "b").with_dependencies(["a"]),
            ],
        );
        let resp = f.executor.run(&ctx, &mut plan).await.unwrap();
        assert_eq!(resp.status, TaskStatus::Cancelled);
        assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Cancelled));
        assert_eq!(resp.result, fallback_summary(2));
        assert_eq!(f.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_summary_falls_back_when_llm_fails() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(diag_agent().into_arc()).unwrap();
        let executor = Executor::new(
            registry,
            Arc::new(MemoryStateStore::new()),
            LlmClient::from_backend(Arc::new(MockBackend::failing("offline"))),
            ExecutorConfig::default(),
        );
        let mut plan = ExecutionPlan::new("req-1", vec![Task::new("a", "query", "a")]);
        let resp = executor.run(&ctx(), &mut plan).await.unwrap();
        assert_eq!(
            resp.result,
            "Executed 1 tasks. Check detailed results in the data field."
        );
        assert_eq!(resp.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_outputs_published_to_context() {
        let f = fixture(vec![diag_agent().into_arc()], ExecutorConfig::default());
        let ctx = ctx();
        let mut plan = ExecutionPlan::new("req-1", vec![Task::new("a", "diagnose", "a")]);
        f.executor.run(&ctx, &mut plan).await.unwrap();
        assert_eq!(ctx.task_output("a").unwrap()["handled_by"], "diag");
        assert_eq!(ctx.plan_id().as_deref(), Some(plan.id.as_str()));
    }

    #[test]
    fn test_ready_frontier_reports_deadlock() {
        let order = vec!["a".to_string(), "b".to_string()];
        let waiting: HashMap<String, Task> = [
            ("a".to_string(), Task::new("a", "query", "a").with_dependencies(["b"])),
            ("b".to_string(), Task::new("b", "query", "b").with_dependencies(["a"])),
        ]
        .into_iter()
        .collect();
        let err = ready_frontier(&order, &waiting, &HashSet::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no tasks ready to execute, but 2 tasks remaining"
        );
    }

    #[test]
    fn test_ready_frontier_keeps_plan_order() {
        let order = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let waiting: HashMap<String, Task> = [
            ("a".to_string(), Task::new("a", "query", "a")),
            ("b".to_string(), Task::new("b", "query", "b").with_dependencies(["a"])),
            ("c".to_string(), Task::new("c", "query", "c")),
        ]
        .into_iter()
        .collect();
        let ready = ready_frontier(&order, &waiting, &HashSet::new()).unwrap();
        assert_eq!(ready, vec!["c".to_string(), "a".to_string()]);
    }
}
