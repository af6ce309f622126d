use crate::error::AppError;
use crate::model::{Task, TaskId, TaskMutation};
use crate::storage::TaskStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "tasks.json";
const STORE_ENV_VAR: &str = "TICKLER_STORE_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTasks {
    schema_version: u32,
    #[serde(default)]
    next_id: TaskId,
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskState {
    pub tasks: Vec<Task>,
    pub next_id: TaskId,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
        }
    }
}

impl TaskState {
    fn task_mut(&mut self, task_id: TaskId) -> Result<&mut Task, AppError> {
        self.tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| AppError::not_found(task_id))
    }
}

/// Task file on disk. Every call reads or rewrites the whole file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self::new(store_path()?))
    }

    pub fn load_state(&self) -> Result<TaskState, AppError> {
        load_state(&self.path)
    }

    pub fn save_state(&self, state: &TaskState) -> Result<(), AppError> {
        save_state(&self.path, state)
    }

    /// Stores a new task under the next free id and returns it.
    pub fn insert_task(&self, mut task: Task) -> Result<Task, AppError> {
        let mut state = self.load_state()?;
        task.id = state.next_id;
        state.next_id = state
            .next_id
            .checked_add(1)
            .ok_or_else(|| AppError::invalid_data("task ids are exhausted"))?;
        state.tasks.push(task.clone());
        self.save_state(&state)?;
        debug!(task_id = task.id, "inserted task");
        Ok(task)
    }

    pub fn delete_task(&self, task_id: TaskId) -> Result<Task, AppError> {
        let mut state = self.load_state()?;
        let index = state
            .tasks
            .iter()
            .position(|task| task.id == task_id)
            .ok_or_else(|| AppError::not_found(task_id))?;
        let removed = state.tasks.remove(index);
        self.save_state(&state)?;
        debug!(task_id, "deleted task");
        Ok(removed)
    }
}

impl TaskStore for JsonStore {
    fn fetch_all_tasks(&self) -> Result<Vec<Task>, AppError> {
        Ok(self.load_state()?.tasks)
    }

    fn apply_mutation(&self, task_id: TaskId, mutation: &TaskMutation) -> Result<Task, AppError> {
        let mut state = self.load_state()?;
        let task = state.task_mut(task_id)?;
        mutation.apply_to(task);
        let updated = task.clone();
        self.save_state(&state)?;
        Ok(updated)
    }

    fn apply_batch(&self, batch: &[(TaskId, TaskMutation)]) -> Result<Vec<Task>, AppError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.load_state()?;
        let mut updated = Vec::with_capacity(batch.len());
        for (task_id, mutation) in batch {
            let task = state.task_mut(*task_id)?;
            mutation.apply_to(task);
            updated.push(task.clone());
        }
        self.save_state(&state)?;
        Ok(updated)
    }
}

pub fn store_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("tickler").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("tickler")
            .join(STORE_FILE_NAME))
    }
}

pub fn load_state(path: &Path) -> Result<TaskState, AppError> {
    if !path.exists() {
        return Ok(TaskState::default());
    }

    let content = std::fs::read_to_string(path)?;
    let stored: StoredTasks =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if stored.schema_version != SCHEMA_VERSION {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    let mut seen = HashSet::new();
    for task in &stored.tasks {
        if task.id == 0 {
            return Err(AppError::invalid_data("task ids must be positive"));
        }
        if !seen.insert(task.id) {
            return Err(AppError::invalid_data(format!(
                "duplicate task id {}",
                task.id
            )));
        }
    }

    let max_id = stored.tasks.iter().map(|task| task.id).max().unwrap_or(0);
    let after_max = max_id
        .checked_add(1)
        .ok_or_else(|| AppError::invalid_data(format!("task id {max_id} is out of range")))?;
    Ok(TaskState {
        next_id: stored.next_id.max(after_max),
        tasks: stored.tasks,
    })
}

pub fn save_state(path: &Path, state: &TaskState) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let stored = StoredTasks {
        schema_version: SCHEMA_VERSION,
        next_id: state.next_id,
        tasks: state.tasks.to_vec(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    std::fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions)?;
    }

    Ok(())
}
