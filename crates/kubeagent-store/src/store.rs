use async_trait::async_trait;
use kubeagent_core::{
    ContextSnapshot, ExecutionPlan, KubeAgentError, KubeAgentResult, Task, TaskStatus,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistence for execution state.
///
/// Callers in the execution path treat save failures as non-fatal. Loads of
/// unknown ids fail with [`KubeAgentError::NotFound`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a task, replacing any earlier copy.
    async fn save_task(&self, task: &Task) -> KubeAgentResult<()>;
    /// Load a task by id.
    async fn load_task(&self, task_id: &str) -> KubeAgentResult<Task>;
    /// Persist a plan, replacing any earlier copy.
    async fn save_plan(&self, plan: &ExecutionPlan) -> KubeAgentResult<()>;
    /// Load a plan by id.
    async fn load_plan(&self, plan_id: &str) -> KubeAgentResult<ExecutionPlan>;
    /// Persist a context snapshot keyed by request id.
    async fn save_context(&self, snapshot: &ContextSnapshot) -> KubeAgentResult<()>;
    /// Load the context snapshot of a request.
    async fn load_context(&self, request_id: &str) -> KubeAgentResult<ContextSnapshot>;
    /// Overwrite the stored status of an already saved task.
    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> KubeAgentResult<()>;
    /// Ids of all stored plans, sorted.
    async fn list_plans(&self) -> KubeAgentResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// MemoryStateStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    tasks: HashMap<String, Task>,
    plans: HashMap<String, ExecutionPlan>,
    contexts: HashMap<String, ContextSnapshot>,
}

/// In-process store backed by hash maps.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored task.
    pub fn all_tasks(&self) -> Vec<Task> {
        self.inner.read().tasks.values().cloned().collect()
    }

    /// Every stored plan.
    pub fn all_plans(&self) -> Vec<ExecutionPlan> {
        self.inner.read().plans.values().cloned().collect()
    }

    /// Remove everything.
    pub fn clear(&self) {
        *self.inner.write() = MemoryInner::default();
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_task(&self, task: &Task) -> KubeAgentResult<()> {
        self.inner.write().tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn load_task(&self, task_id: &str) -> KubeAgentResult<Task> {
        self.inner
            .read()
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| KubeAgentError::not_found("task", task_id))
    }

    async fn save_plan(&self, plan: &ExecutionPlan) -> KubeAgentResult<()> {
        self.inner.write().plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn load_plan(&self, plan_id: &str) -> KubeAgentResult<ExecutionPlan> {
        self.inner
            .read()
            .plans
            .get(plan_id)
            .cloned()
            .ok_or_else(|| KubeAgentError::not_found("plan", plan_id))
    }

    async fn save_context(&self, snapshot: &ContextSnapshot) -> KubeAgentResult<()> {
        self.inner
            .write()
            .contexts
            .insert(snapshot.request_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load_context(&self, request_id: &str) -> KubeAgentResult<ContextSnapshot> {
        self.inner
            .read()
            .contexts
            .get(request_id)
            .cloned()
            .ok_or_else(|| KubeAgentError::not_found("context", request_id))
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> KubeAgentResult<()> {
        let mut inner = self.inner.write();
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| KubeAgentError::not_found("task", task_id))?;
        task.status = status;
        Ok(())
    }

    async fn list_plans(&self) -> KubeAgentResult<Vec<String>> {
        let mut ids: Vec<String> = self.inner.read().plans.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// FileStateStore
// ---------------------------------------------------------------------------

/// File-based store: one pretty-printed JSON file per record under
/// `tasks/`, `plans/` and `contexts/`.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Open a store rooted at `dir`, creating its subdirectories.
    pub async fn new(dir: PathBuf) -> KubeAgentResult<Self> {
        for sub in ["tasks", "plans", "contexts"] {
            tokio::fs::create_dir_all(dir.join(sub)).await?;
        }
        Ok(Self { dir })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, kind: &str, id: &str) -> KubeAgentResult<PathBuf> {
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\'])
        {
            return Err(KubeAgentError::Store(format!(
                "invalid {kind} id for file storage: {id:?}"
            )));
        }
        Ok(self.dir.join(format!("{kind}s")).join(format!("{id}.json")))
    }

    async fn write_record<T: Serialize + Sync>(
        &self,
        kind: &str,
        id: &str,
        value: &T,
    ) -> KubeAgentResult<()> {
        let path = self.record_path(kind, id)?;
        let json = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&path, json).await?;
        debug!(kind, id, path = %path.display(), "Wrote record");
        Ok(())
    }

    async fn read_record<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        id: &str,
    ) -> KubeAgentResult<T> {
        let path = self.record_path(kind, id)?;
        if !path.exists() {
            return Err(KubeAgentError::not_found(kind, id));
        }
        let data = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&data)
            .map_err(|e| KubeAgentError::Store(format!("Failed to parse {kind} {id}: {e}")))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save_task(&self, task: &Task) -> KubeAgentResult<()> {
        self.write_record("task", &task.id, task).await
    }

    async fn load_task(&self, task_id: &str) -> KubeAgentResult<Task> {
        self.read_record("task", task_id).await
    }

    async fn save_plan(&self, plan: &ExecutionPlan) -> KubeAgentResult<()> {
        self.write_record("plan", &plan.id, plan).await
    }

    async fn load_plan(&self, plan_id: &str) -> KubeAgentResult<ExecutionPlan> {
        self.read_record("plan", plan_id).await
    }

    async fn save_context(&self, snapshot: &ContextSnapshot) -> KubeAgentResult<()> {
        self.write_record("context", &snapshot.request_id, snapshot)
            .await
    }

    async fn load_context(&self, request_id: &str) -> KubeAgentResult<ContextSnapshot> {
        self.read_record("context", request_id).await
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> KubeAgentResult<()> {
        let mut task = self.load_task(task_id).await?;
        task.status = status;
        self.save_task(&task).await
    }

    async fn list_plans(&self) -> KubeAgentResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.dir.join("plans")).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
