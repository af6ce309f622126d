pub mod json_store;

use crate::error::AppError;
use crate::model::{Task, TaskId, TaskMutation};

pub use json_store::JsonStore;

/// Persistence boundary the engine reads snapshots from and proposes
/// mutations to.
pub trait TaskStore: Send + Sync {
    fn fetch_all_tasks(&self) -> Result<Vec<Task>, AppError>;

    fn apply_mutation(&self, task_id: TaskId, mutation: &TaskMutation) -> Result<Task, AppError>;

    /// Applies a batch of mutations. Stores that can write a batch at once
    /// should override this so a failure leaves none of it applied.
    fn apply_batch(&self, batch: &[(TaskId, TaskMutation)]) -> Result<Vec<Task>, AppError> {
        batch
            .iter()
            .map(|(task_id, mutation)| self.apply_mutation(*task_id, mutation))
            .collect()
    }
}
