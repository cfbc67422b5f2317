//! Task identity, definitions and cluster status updates.

use crate::constants::{labels, TASK_ID_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Cluster-wide unique task identifier: `<task-name>__<uuid>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Mint a fresh id for a task about to be launched
    pub fn generate(task_name: &str) -> Self {
        Self(format!("{task_name}{TASK_ID_SEPARATOR}{}", Uuid::new_v4()))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Task name encoded in the id, if the id follows the `<name>__<uuid>` layout
    pub fn task_name(&self) -> Option<&str> {
        self.0
            .rsplit_once(TASK_ID_SEPARATOR)
            .map(|(name, _)| name)
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cluster task states, as reported in status updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Killing,
    Finished,
    Failed,
    Killed,
    Error,
    Lost,
    Dropped,
    Gone,
    Unreachable,
    Unknown,
}

impl TaskState {
    /// The task is no longer running and will not run again under this id
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Staging | Self::Starting | Self::Running | Self::Killing | Self::Unreachable
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Staging | Self::Starting)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Staging => "TASK_STAGING",
            Self::Starting => "TASK_STARTING",
            Self::Running => "TASK_RUNNING",
            Self::Killing => "TASK_KILLING",
            Self::Finished => "TASK_FINISHED",
            Self::Failed => "TASK_FAILED",
            Self::Killed => "TASK_KILLED",
            Self::Error => "TASK_ERROR",
            Self::Lost => "TASK_LOST",
            Self::Dropped => "TASK_DROPPED",
            Self::Gone => "TASK_GONE",
            Self::Unreachable => "TASK_UNREACHABLE",
            Self::Unknown => "TASK_UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Why the cluster manager produced a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    /// Answer to an explicit reconciliation request
    Reconciliation,
    /// The cluster manager does not know this task id
    TaskUnknown,
    /// A kill was delivered before the task finished launching
    TaskKilledDuringLaunch,
    ExecutorTerminated,
    AgentRemoved,
    CommandExecutorFailed,
    Other,
}

/// A status update received from the cluster manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub reason: Option<StatusReason>,
    pub message: Option<String>,
    /// Readiness check outcome reported with RUNNING updates; `None` when no check is defined.
    pub ready: Option<bool>,
}

impl TaskStatus {
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            reason: None,
            message: None,
            ready: None,
        }
    }

    pub fn with_reason(mut self, reason: StatusReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_readiness(mut self, ready: bool) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Terminal update meaning the cluster manager has no record of the task,
    /// as opposed to having completed a kill or observed an exit.
    pub fn is_unknown_task(&self) -> bool {
        if !self.is_terminal() {
            return false;
        }
        matches!(self.state, TaskState::Unknown)
            || matches!(self.reason, Some(StatusReason::TaskUnknown))
            || (self.state == TaskState::Lost
                && matches!(self.reason, Some(StatusReason::Reconciliation)))
    }
}

/// What a task is expected to do once launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalState {
    Running,
    Finish,
    Once,
}

impl GoalState {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(Self::Running),
            "FINISH" => Some(Self::Finish),
            "ONCE" => Some(Self::Once),
            _ => None,
        }
    }
}

/// A task definition as launched and recorded in the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Instance name, `<pod-type>-<index>-<task>`
    pub name: String,
    pub task_id: TaskId,
    /// Pod instance the task belongs to, `<pod-type>-<index>`
    pub pod_instance: String,
    pub agent_id: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl TaskInfo {
    pub fn new(name: impl Into<String>, pod_instance: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            task_id: TaskId::generate(&name),
            name,
            pod_instance: pod_instance.into(),
            agent_id: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_permanently_failed(&self) -> bool {
        self.labels
            .get(labels::PERMANENTLY_FAILED)
            .is_some_and(|v| v == "true")
    }

    /// Returns a copy labeled as permanently failed
    pub fn mark_permanently_failed(&self) -> Self {
        self.clone().with_label(labels::PERMANENTLY_FAILED, "true")
    }

    /// Returns a copy with the permanent-failure label removed (administrative clear)
    pub fn clear_permanently_failed(&self) -> Self {
        let mut task = self.clone();
        task.labels.remove(labels::PERMANENTLY_FAILED);
        task
    }

    /// Declared goal, defaulting to RUNNING when unlabeled
    pub fn goal_state(&self) -> GoalState {
        self.labels
            .get(labels::GOAL_STATE)
            .and_then(|v| GoalState::parse(v))
            .unwrap_or(GoalState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_round_trips_name() {
        let id = TaskId::generate("hello-0-server");
        assert_eq!(id.task_name(), Some("hello-0-server"));
        assert!(id.as_str().starts_with("hello-0-server__"));
        assert_eq!(TaskId::new("garbage").task_name(), None);
        assert!(TaskId::new("").is_empty());
    }

    #[test]
    fn test_terminal_states() {
        for state in [
            TaskState::Finished,
            TaskState::Failed,
            TaskState::Killed,
            TaskState::Error,
            TaskState::Lost,
            TaskState::Gone,
            TaskState::Unknown,
        ] {
            assert!(state.is_terminal(), "{state} should be terminal");
        }
        for state in [
            TaskState::Staging,
            TaskState::Starting,
            TaskState::Running,
            TaskState::Killing,
        ] {
            assert!(!state.is_terminal(), "{state} should not be terminal");
        }
    }

    #[test]
    fn test_unknown_task_detection() {
        let id = TaskId::new("a__1");
        assert!(TaskStatus::new(id.clone(), TaskState::Unknown).is_unknown_task());
        assert!(TaskStatus::new(id.clone(), TaskState::Lost)
            .with_reason(StatusReason::Reconciliation)
            .is_unknown_task());
        assert!(TaskStatus::new(id.clone(), TaskState::Gone)
            .with_reason(StatusReason::TaskUnknown)
            .is_unknown_task());
        assert!(!TaskStatus::new(id.clone(), TaskState::Killed).is_unknown_task());
        assert!(!TaskStatus::new(id, TaskState::Running)
            .with_reason(StatusReason::TaskUnknown)
            .is_unknown_task());
    }

    #[test]
    fn test_permanent_failure_label() {
        let task = TaskInfo::new("world-1-server", "world-1");
        assert!(!task.is_permanently_failed());
        let failed = task.mark_permanently_failed();
        assert!(failed.is_permanently_failed());
        assert!(!failed.clear_permanently_failed().is_permanently_failed());
    }

    #[test]
    fn test_goal_state_label() {
        let task = TaskInfo::new("init-0-setup", "init-0");
        assert_eq!(task.goal_state(), GoalState::Running);
        let once = task.with_label(labels::GOAL_STATE, "ONCE");
        assert_eq!(once.goal_state(), GoalState::Once);
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&TaskState::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }
}
