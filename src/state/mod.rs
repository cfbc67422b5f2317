//! # State Store
//!
//! Storage contract for launched task definitions and their last known
//! status. The persistence backend is pluggable; [`MemStateStore`] keeps
//! everything in memory.

pub mod mem;

use crate::error::Result;
use crate::models::{GoalState, TaskInfo, TaskState, TaskStatus};

pub use mem::MemStateStore;

pub trait StateStore: Send + Sync {
    fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<()>;

    /// Record the latest status for the named task
    fn store_status(&self, task_name: &str, status: &TaskStatus) -> Result<()>;

    fn fetch_task(&self, task_name: &str) -> Result<Option<TaskInfo>>;

    fn fetch_tasks(&self) -> Result<Vec<TaskInfo>>;

    fn fetch_status(&self, task_name: &str) -> Result<Option<TaskStatus>>;

    fn clear_task(&self, task_name: &str) -> Result<()>;

    /// Tasks that have stopped and should be relaunched, plus any task labeled
    /// permanently failed. Tasks that finished with a FINISH or ONCE goal are done.
    fn fetch_tasks_needing_recovery(&self) -> Result<Vec<TaskInfo>> {
        let mut needing_recovery = Vec::new();
        for task in self.fetch_tasks()? {
            if task.is_permanently_failed() {
                needing_recovery.push(task);
                continue;
            }
            let Some(status) = self.fetch_status(&task.name)? else {
                continue;
            };
            if status.task_id != task.task_id || !status.is_terminal() {
                continue;
            }
            let finished_as_intended =
                status.state == TaskState::Finished && task.goal_state() != GoalState::Running;
            if !finished_as_intended {
                needing_recovery.push(task);
            }
        }
        needing_recovery.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(needing_recovery)
    }
}
