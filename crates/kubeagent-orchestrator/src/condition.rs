use kubeagent_core::{Task, TaskStatus};
use std::collections::HashMap;

/// Outcome of evaluating a task's run condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Run the task.
    Run,
    /// Do not run; the reason is recorded as the task's error.
    Skip(String),
}

impl Gate {
    /// Whether the task should run.
    pub fn should_run(&self) -> bool {
        matches!(self, Gate::Run)
    }

    /// The skip reason, if the task is skipped.
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Gate::Run => None,
            Gate::Skip(reason) => Some(reason),
        }
    }
}

/// Decide whether `task` runs given the current status of every plan task.
///
/// `on_success` requires every listed task to have completed. `on_failure`
/// requires at least one listed task to have failed. When both are set only
/// `on_success` is consulted.
pub fn evaluate(task: &Task, statuses: &HashMap<String, TaskStatus>) -> Gate {
    let Some(condition) = &task.condition else {
        return Gate::Run;
    };

    if !condition.on_success.is_empty() {
        for id in &condition.on_success {
            match statuses.get(id) {
                None => return Gate::Skip(format!("condition dependency {id} not found")),
                Some(TaskStatus::Completed) => {}
                Some(status) => {
                    return Gate::Skip(format!(
                        "condition not met: task {id} did not succeed (status: {status})"
                    ))
                }
            }
        }
        return Gate::Run;
    }

    if !condition.on_failure.is_empty() {
        for id in &condition.on_failure {
            match statuses.get(id) {
                Some(TaskStatus::Failed) => return Gate::Run,
                Some(_) => {}
                None => return Gate::Skip(format!("condition dependency {id} not found")),
            }
        }
        return Gate::Skip("condition not met: no specified task failed".to_string());
    }

    Gate::Run
}
