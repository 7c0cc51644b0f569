//! Property tests for graph validation and round-based scheduling over
//! randomly generated task graphs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use kubeagent_agent::{Agent, AgentConfig, LlmClient, MockBackend};
use kubeagent_core::{
    AgentContext, AgentType, ExecutionPlan, KubeAgentError, KubeAgentResult, Task, TaskCondition,
    TaskStatus, TaskType,
};
use kubeagent_orchestrator::{validate, Coordinator};
use kubeagent_store::MemoryStateStore;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Worker that fails a fixed set of ids and logs every start.
struct FlakyAgent {
    config: AgentConfig,
    fail: HashSet<String>,
    started: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Agent for FlakyAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn can_handle(&self, _task_type: &TaskType) -> bool {
        true
    }

    async fn execute(&self, _ctx: &AgentContext, task: Task) -> KubeAgentResult<Task> {
        self.started.lock().push(task.id.clone());
        tokio::task::yield_now().await;
        if self.fail.contains(&task.id) {
            return Err(KubeAgentError::TaskExecution {
                task_id: task.id.clone(),
                reason: "injected".to_string(),
            });
        }
        Ok(task)
    }
}

#[derive(Debug, Clone)]
struct GraphSpec {
    /// deps[i] lists indices smaller than i.
    deps: Vec<Vec<usize>>,
    failing: Vec<bool>,
    gated: Vec<Option<bool>>,
    order: Vec<usize>,
}

fn graph_strategy() -> impl Strategy<Value = GraphSpec> {
    (1usize..12).prop_flat_map(|n| {
        let deps = (0..n)
            .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i.min(3)))
            .collect::<Vec<_>>();
        (
            deps,
            proptest::collection::vec(proptest::bool::weighted(0.25), n),
            proptest::collection::vec(proptest::option::of(any::<bool>()), n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
            .prop_map(|(deps, failing, gated, order)| GraphSpec {
                deps,
                failing,
                gated,
                order,
            })
    })
}

fn id(i: usize) -> String {
    format!("t{i}")
}

fn build_tasks(graph: &GraphSpec) -> Vec<Task> {
    graph.order
        .iter()
        .map(|&i| {
            let mut task = Task::new(id(i), TaskType::Diagnose, format!("task {i}"))
                .with_dependencies(graph.deps[i].iter().map(|&d| id(d)));
            // Gate on the first dependency, on success or on failure.
            if let (Some(on_success), Some(&first)) = (graph.gated[i], graph.deps[i].first()) {
                let condition = if on_success {
                    TaskCondition::on_success([id(first)])
                } else {
                    TaskCondition::on_failure([id(first)])
                };
                task = task.with_condition(condition);
            }
            task
        })
        .collect()
}

fn run_plan(graph: &GraphSpec) -> (ExecutionPlan, Vec<String>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    runtime.block_on(async {
        let coordinator = Coordinator::new(
            LlmClient::from_backend(Arc::new(MockBackend::new())),
            Arc::new(MemoryStateStore::new()),
        );
        let started = Arc::new(Mutex::new(Vec::new()));
        let fail = (0..graph.deps.len())
            .filter(|&i| graph.failing[i])
            .map(id)
            .collect();
        coordinator
            .register_agent(Arc::new(FlakyAgent {
                config: AgentConfig::new("flaky", AgentType::Diagnostician, "random outcomes"),
                fail,
                started: Arc::clone(&started),
            }))
            .unwrap();

        let mut plan = ExecutionPlan::new("prop", build_tasks(graph));
        let ctx = Arc::new(AgentContext::for_request("prop", "tester"));
        coordinator.execute_plan(&ctx, &mut plan).await.unwrap();
        let started = started.lock().clone();
        (plan, started)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_generated_graphs_validate(graph in graph_strategy()) {
        prop_assert!(validate(&build_tasks(&graph)).is_ok());
    }

    #[test]
    fn prop_back_edge_is_cycle(graph in graph_strategy()) {
        let mut tasks = build_tasks(&graph);
        let n = graph.deps.len();
        // Chain 0 -> ... -> n-1 through extra edges, then close the loop.
        for task in &mut tasks {
            let i: usize = task.id[1..].parse().unwrap();
            if i > 0 {
                task.dependencies.push(id(i - 1));
            }
            if i == 0 {
                task.dependencies.push(id(n - 1));
            }
        }
        prop_assert!(matches!(
            validate(&tasks),
            Err(KubeAgentError::CyclicDependency(_))
        ));
    }

    #[test]
    fn prop_no_task_starts_before_its_dependencies(graph in graph_strategy()) {
        let (plan, started) = run_plan(&graph);
        let by_id: HashMap<&str, &Task> = plan.tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        prop_assert_eq!(plan.tasks.len(), graph.deps.len());
        for task in &plan.tasks {
            prop_assert!(task.status.is_terminal(), "{} ended {}", task.id, task.status);
            prop_assert!(task.status != TaskStatus::Cancelled);
        }

        // Position in the start log must follow every dependency's start,
        // and each dependency must be finished when the dependent starts.
        let position: HashMap<&str, usize> =
            started.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for task in &plan.tasks {
            let Some(started_at) = task.started_at else { continue };
            for dep in &task.dependencies {
                let dep_task = by_id[dep.as_str()];
                let completed_at = dep_task.completed_at.expect("dependency processed");
                prop_assert!(
                    completed_at <= started_at,
                    "{} started before {} finished",
                    task.id,
                    dep
                );
                if let Some(dep_pos) = position.get(dep.as_str()) {
                    prop_assert!(*dep_pos < position[task.id.as_str()]);
                }
            }
        }

        // Failures and skips line up with the injected outcomes and gates.
        for task in &plan.tasks {
            let i: usize = task.id[1..].parse().unwrap();
            match task.status {
                TaskStatus::Completed => prop_assert!(!graph.failing[i]),
                TaskStatus::Failed => prop_assert!(graph.failing[i]),
                TaskStatus::Skipped => prop_assert!(task.condition.is_some()),
                other => prop_assert!(false, "unexpected status {}", other),
            }
        }
    }
}
