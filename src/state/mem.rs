use super::StateStore;
use crate::error::{Result, SchedulerError};
use crate::models::{TaskInfo, TaskStatus};
use dashmap::DashMap;
use tracing::debug;

/// In-memory state store keyed by task name
#[derive(Debug, Default)]
pub struct MemStateStore {
    tasks: DashMap<String, TaskInfo>,
    statuses: DashMap<String, TaskStatus>,
}

impl MemStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemStateStore {
    fn store_tasks(&self, tasks: &[TaskInfo]) -> Result<()> {
        for task in tasks {
            debug!(task = %task.name, task_id = %task.task_id, "Storing task");
            if let Some(previous) = self.tasks.insert(task.name.clone(), task.clone()) {
                if previous.task_id != task.task_id {
                    // A relaunch under a new id invalidates the old status.
                    self.statuses.remove(&task.name);
                }
            }
        }
        Ok(())
    }

    fn store_status(&self, task_name: &str, status: &TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .get(task_name)
            .ok_or_else(|| SchedulerError::Storage(format!("no task named {task_name}")))?;
        if task.task_id != status.task_id {
            return Err(SchedulerError::Storage(format!(
                "status task id {} does not match stored task id {} for {task_name}",
                status.task_id, task.task_id
            )));
        }
        drop(task);
        self.statuses.insert(task_name.to_string(), status.clone());
        Ok(())
    }

    fn fetch_task(&self, task_name: &str) -> Result<Option<TaskInfo>> {
        Ok(self.tasks.get(task_name).map(|t| t.clone()))
    }

    fn fetch_tasks(&self) -> Result<Vec<TaskInfo>> {
        let mut tasks: Vec<TaskInfo> = self.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }

    fn fetch_status(&self, task_name: &str) -> Result<Option<TaskStatus>> {
        Ok(self.statuses.get(task_name).map(|s| s.clone()))
    }

    fn clear_task(&self, task_name: &str) -> Result<()> {
        self.tasks.remove(task_name);
        self.statuses.remove(task_name);
        Ok(())
    }
}
