use kubeagent_core::{KubeAgentError, KubeAgentResult, Task};
use std::collections::HashMap;

const UNVISITED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// Check that `tasks` form a runnable DAG.
///
/// Order of checks: unique ids, then every id referenced by `dependencies`
/// or a condition exists, then the graph has no cycle. Condition ids count
/// as edges since a gated task waits for the tasks its condition reads.
pub fn validate(tasks: &[Task]) -> KubeAgentResult<()> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (pos, task) in tasks.iter().enumerate() {
        if index.insert(task.id.as_str(), pos).is_some() {
            return Err(KubeAgentError::DuplicateTask(task.id.clone()));
        }
    }

    for task in tasks {
        if let Some(missing) = task.referenced_ids().find(|id| !index.contains_key(id)) {
            return Err(KubeAgentError::DanglingDependency {
                task_id: task.id.clone(),
                missing_id: missing.to_string(),
            });
        }
    }

    let edges: Vec<Vec<usize>> = tasks
        .iter()
        .map(|t| t.referenced_ids().map(|id| index[id]).collect())
        .collect();

    if let Some(pos) = find_cycle(&edges) {
        return Err(KubeAgentError::CyclicDependency(tasks[pos].id.clone()));
    }
    Ok(())
}

/// Iterative DFS over `edges`. Returns the position of a node on a cycle.
fn find_cycle(edges: &[Vec<usize>]) -> Option<usize> {
    let mut state = vec![UNVISITED; edges.len()];
    // (node, index of the next outgoing edge to follow)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..edges.len() {
        if state[root] != UNVISITED {
            continue;
        }
        state[root] = IN_PROGRESS;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            if let Some(&dep) = edges[node].get(next) {
                top.1 += 1;
                match state[dep] {
                    UNVISITED => {
                        state[dep] = IN_PROGRESS;
                        stack.push((dep, 0));
                    }
                    IN_PROGRESS => return Some(dep),
                    _ => {}
                }
            } else {
                state[node] = DONE;
                stack.pop();
            }
        }
    }
    None
}
