//! Leaf plan element: one resource requirement and the task instances launched for it.

use super::{Element, Status};
use crate::constants::events;
use crate::events::PlanEventPublisher;
use crate::logging::log_step_operation;
use crate::models::{
    GoalState, Operation, RecoveryType, ResourceRequirement, TaskId, TaskInfo, TaskState,
    TaskStatus,
};
use crate::recovery::LaunchConstrainer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Progress of one task instance tracked by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    InProgress,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
struct TrackedTask {
    task: TaskInfo,
    status: InstanceStatus,
}

#[derive(Debug)]
struct StepState {
    status: Status,
    tasks: HashMap<TaskId, TrackedTask>,
    errors: Vec<String>,
}

pub struct Step {
    id: Uuid,
    name: String,
    requirement: Option<ResourceRequirement>,
    state: Mutex<StepState>,
    launch_constrainer: Option<Arc<dyn LaunchConstrainer>>,
    publisher: OnceLock<PlanEventPublisher>,
}

impl Step {
    pub fn new(name: impl Into<String>, requirement: Option<ResourceRequirement>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            requirement,
            state: Mutex::new(StepState {
                status: Status::Pending,
                tasks: HashMap::new(),
                errors: Vec::new(),
            }),
            launch_constrainer: None,
            publisher: OnceLock::new(),
        }
    }

    /// Step named after its requirement, `<pod-instance>:[task, ...]`
    pub fn from_requirement(requirement: ResourceRequirement) -> Self {
        Self::new(requirement.step_name(), Some(requirement))
    }

    /// A step that could not be built. It reports `ERROR` and is never offered resources.
    pub fn invalid(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(name, None).with_error(error)
    }

    /// Initial status other than `PENDING`, e.g. for work already deployed
    pub fn with_status(self, status: Status) -> Self {
        self.state.lock().status = status;
        self
    }

    pub fn with_error(self, error: impl Into<String>) -> Self {
        self.state.lock().errors.push(error.into());
        self
    }

    /// Recovery steps report every launch to the constrainer that gates them
    pub fn with_launch_constrainer(mut self, constrainer: Arc<dyn LaunchConstrainer>) -> Self {
        self.launch_constrainer = Some(constrainer);
        self
    }

    pub fn attach_publisher(&self, publisher: PlanEventPublisher) {
        let _ = self.publisher.set(publisher);
    }

    pub fn requirement(&self) -> Option<&ResourceRequirement> {
        self.requirement.as_ref()
    }

    pub fn recovery_type(&self) -> RecoveryType {
        self.requirement
            .as_ref()
            .map(|r| r.recovery_type)
            .unwrap_or(RecoveryType::None)
    }

    /// Hand out the requirement for this offer cycle, if there is anything to request.
    /// A pending step with a requirement moves to `PREPARED`.
    pub fn start(&self) -> Option<ResourceRequirement> {
        let requirement = self.requirement.clone()?;
        let mut state = self.state.lock();
        if state.status == Status::Pending {
            self.transition(&mut state, Status::Prepared);
        }
        Some(requirement)
    }

    /// Record the operations actually performed for this step's requirement.
    ///
    /// Tracked instances are rebuilt from the non-transient launches. With no
    /// operations at all the step returns to `PENDING` to be retried.
    pub fn update_offer_status(&self, operations: &[Operation]) {
        let launched: Vec<&TaskInfo> = operations
            .iter()
            .filter_map(Operation::launched_task)
            .filter(|task| !task.task_id.is_empty())
            .collect();

        info!(
            step = %self.name,
            operations = operations.len(),
            launches = launched.len(),
            kinds = ?operations.iter().map(Operation::kind).collect::<Vec<_>>(),
            "Updating step with offer outcome"
        );

        if let Some(constrainer) = &self.launch_constrainer {
            let recovery_type = self.recovery_type();
            for operation in operations.iter().filter(|op| op.launched_task().is_some()) {
                constrainer.launch_happened(operation, recovery_type);
            }
        }

        let mut state = self.state.lock();
        state.tasks = launched
            .into_iter()
            .map(|task| {
                (
                    task.task_id.clone(),
                    TrackedTask {
                        task: task.clone(),
                        status: InstanceStatus::InProgress,
                    },
                )
            })
            .collect();

        let next = if operations.is_empty() {
            Status::Pending
        } else {
            Status::InProgress
        };
        self.transition(&mut state, next);
        debug!(
            step = %self.name,
            task_ids = ?state.tasks.keys().map(TaskId::as_str).collect::<Vec<_>>(),
            "Step waiting for task status updates"
        );
    }

    /// Ids of the task instances this step is currently tracking
    pub fn tracked_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.state.lock().tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn instance_status(&self, task_id: &TaskId) -> Option<InstanceStatus> {
        self.state.lock().tasks.get(task_id).map(|t| t.status)
    }

    /// Status for display, with instance progress while work is in flight
    pub fn display_status(&self) -> String {
        let status = self.status();
        let state = self.state.lock();
        if status.is_running() && !state.tasks.is_empty() {
            let complete = state
                .tasks
                .values()
                .filter(|t| t.status == InstanceStatus::Complete)
                .count();
            format!("{status} ({complete}/{} tasks ready)", state.tasks.len())
        } else {
            status.to_string()
        }
    }

    pub fn add_error(&self, error: impl Into<String>) {
        let error = error.into();
        warn!(step = %self.name, error = %error, "Step error recorded");
        self.state.lock().errors.push(error);
    }

    fn instance_status_for(task: &TaskInfo, status: &TaskStatus) -> Option<InstanceStatus> {
        let goal = task.goal_state();
        match status.state {
            TaskState::Staging | TaskState::Starting => Some(InstanceStatus::InProgress),
            TaskState::Running => {
                if goal == GoalState::Running && status.ready != Some(false) {
                    Some(InstanceStatus::Complete)
                } else {
                    Some(InstanceStatus::InProgress)
                }
            }
            TaskState::Finished if goal != GoalState::Running => Some(InstanceStatus::Complete),
            TaskState::Unreachable => None,
            _ => Some(InstanceStatus::Error),
        }
    }

    fn transition(&self, state: &mut StepState, next: Status) {
        let previous = state.status;
        if previous == next {
            return;
        }
        state.status = next;
        info!(
            step = %self.name,
            from = %previous,
            to = %next,
            "Step status changed"
        );
        if let Some(publisher) = self.publisher.get() {
            publisher.publish(
                events::STEP_STATUS_CHANGED,
                self.id,
                self.name.clone(),
                next,
                serde_json::json!({ "previous": previous.as_str() }),
            );
        }
    }
}

impl Element for Step {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        let state = self.state.lock();
        if state.errors.is_empty() {
            state.status
        } else {
            Status::Error
        }
    }

    fn errors(&self) -> Vec<String> {
        self.state.lock().errors.clone()
    }

    fn update(&self, status: &TaskStatus) {
        let mut state = self.state.lock();

        let Some(tracked) = state.tasks.get(&status.task_id) else {
            debug!(step = %self.name, task_id = %status.task_id, "Ignoring status for untracked task");
            return;
        };
        if state.status.is_complete() {
            debug!(step = %self.name, task_id = %status.task_id, "Ignoring status, step already complete");
            return;
        }

        let Some(instance_status) = Self::instance_status_for(&tracked.task, status) else {
            debug!(step = %self.name, task_id = %status.task_id, state = %status.state, "No progress from status");
            return;
        };

        if let Some(tracked) = state.tasks.get_mut(&status.task_id) {
            tracked.status = instance_status;
        }
        info!(
            step = %self.name,
            task_id = %status.task_id,
            task_state = %status.state,
            instance_status = ?instance_status,
            "Task instance status updated"
        );

        if instance_status == InstanceStatus::Error {
            self.transition(&mut state, Status::Pending);
        } else if state
            .tasks
            .values()
            .all(|t| t.status == InstanceStatus::Complete)
        {
            self.transition(&mut state, Status::Complete);
        }
    }

    fn restart(&self) {
        let mut state = self.state.lock();
        state.tasks.clear();
        self.transition(&mut state, Status::Pending);
        log_step_operation("restart", &self.id.to_string(), &self.name, "PENDING", None);
    }

    fn force_complete(&self) {
        let mut state = self.state.lock();
        self.transition(&mut state, Status::Complete);
        log_step_operation("force_complete", &self.id.to_string(), &self.name, "COMPLETE", None);
    }

    fn asset_name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .field("recovery_type", &self.recovery_type())
            .finish()
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.requirement == other.requirement
            && self.status() == other.status()
    }
}
