//! Plan manager whose plan is rebuilt from stopped tasks on every offer cycle.

use super::{FailureMonitor, LaunchConstrainer};
use crate::constants::{events, plans};
use crate::error::Result;
use crate::events::PlanEventPublisher;
use crate::models::requirement::step_name;
use crate::models::{RecoveryType, ResourceRequirement, TaskId, TaskInfo, TaskStatus};
use crate::plan::strategy::{ParallelStrategy, RandomizedStrategy, SerialStrategy, Strategy};
use crate::plan::{Element, Phase, Plan, PlanManager, Step};
use crate::state::StateStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument, warn};

/// Stopped tasks of one pod instance, recovered together by one step
#[derive(Debug)]
struct RecoveryGroup {
    pod_instance: String,
    tasks: Vec<TaskInfo>,
    recovery_type: RecoveryType,
}

impl RecoveryGroup {
    fn task_short_names(&self) -> Vec<String> {
        let prefix = format!("{}-", self.pod_instance);
        self.tasks
            .iter()
            .map(|task| {
                task.name
                    .strip_prefix(&prefix)
                    .unwrap_or(&task.name)
                    .to_string()
            })
            .collect()
    }

    fn step_name(&self) -> String {
        step_name(&self.pod_instance, &self.task_short_names())
    }
}

pub struct RecoveryPlanManager {
    state_store: Arc<dyn StateStore>,
    launch_constrainer: Arc<dyn LaunchConstrainer>,
    failure_monitor: Arc<dyn FailureMonitor>,
    randomized: bool,
    plan: RwLock<Arc<Plan>>,
    publisher: OnceLock<PlanEventPublisher>,
}

impl RecoveryPlanManager {
    pub fn new(
        state_store: Arc<dyn StateStore>,
        launch_constrainer: Arc<dyn LaunchConstrainer>,
        failure_monitor: Arc<dyn FailureMonitor>,
    ) -> Self {
        Self {
            state_store,
            launch_constrainer,
            failure_monitor,
            randomized: true,
            plan: RwLock::new(Arc::new(Self::build_plan(Vec::new(), true))),
            publisher: OnceLock::new(),
        }
    }

    /// Recover in declared order instead of shuffled, for deterministic tests
    pub fn with_ordered_recovery(mut self) -> Self {
        self.randomized = false;
        self
    }

    fn build_plan(steps: Vec<Arc<Step>>, randomized: bool) -> Plan {
        let strategy: Arc<dyn Strategy> = if randomized {
            Arc::new(RandomizedStrategy)
        } else {
            Arc::new(ParallelStrategy)
        };
        let phase = Arc::new(Phase::new(plans::RECOVERY_PHASE_NAME, steps, strategy));
        Plan::new(plans::RECOVERY_PLAN_NAME, vec![phase], Arc::new(SerialStrategy))
    }

    /// Rebuild the recovery plan from the state store, keeping steps still in flight
    #[instrument(skip_all)]
    pub fn refresh(&self, dirty_assets: &HashSet<String>) -> Result<Arc<Plan>> {
        let previous = self.plan();
        let previous_steps: HashMap<String, Arc<Step>> = previous
            .steps()
            .map(|step| (step.name().to_string(), Arc::clone(step)))
            .collect();

        let stopped = self.state_store.fetch_tasks_needing_recovery()?;
        let still_stopped: HashSet<TaskId> = stopped.iter().map(|task| task.task_id.clone()).collect();
        self.failure_monitor.retain_stopped(&still_stopped);

        let groups = self.recovery_groups(stopped, dirty_assets)?;
        let mut steps: Vec<Arc<Step>> = Vec::with_capacity(groups.len());
        let mut kept: HashSet<String> = HashSet::new();

        for group in groups {
            let name = group.step_name();
            match previous_steps.get(&name) {
                Some(existing)
                    if !existing.is_complete()
                        && !(existing.recovery_type() == RecoveryType::Transient
                            && group.recovery_type == RecoveryType::Permanent) =>
                {
                    debug!(step = %name, status = %existing.status(), "Keeping recovery step");
                    steps.push(Arc::clone(existing));
                }
                _ => {
                    info!(
                        step = %name,
                        recovery_type = %group.recovery_type,
                        "Creating recovery step"
                    );
                    steps.push(Arc::new(self.new_step(&group)));
                }
            }
            kept.insert(name);
        }

        // Steps whose tasks left the recovery set stay until their launch settles.
        for (name, step) in &previous_steps {
            if kept.contains(name) {
                continue;
            }
            if step.is_running() {
                steps.push(Arc::clone(step));
            } else {
                debug!(step = %name, status = %step.status(), "Dropping recovery step");
            }
        }
        steps.sort_by(|a, b| a.name().cmp(b.name()));

        let plan = Arc::new(Self::build_plan(steps, self.randomized));
        {
            let mut current = self.plan.write();
            // Operator interrupts survive the rebuild.
            plan.inherit_interrupts(&current);
            *current = Arc::clone(&plan);
        }
        if let Some(publisher) = self.publisher.get() {
            plan.attach_publisher(publisher.clone());
            publisher.publish(
                events::RECOVERY_PLAN_REBUILT,
                plan.id(),
                plan.name(),
                plan.status(),
                serde_json::json!({ "steps": plan.total_steps() }),
            );
        }
        Ok(plan)
    }

    fn new_step(&self, group: &RecoveryGroup) -> Step {
        let requirement = ResourceRequirement::new(&group.pod_instance, group.task_short_names())
            .with_recovery_type(group.recovery_type);
        Step::from_requirement(requirement).with_launch_constrainer(Arc::clone(&self.launch_constrainer))
    }

    /// Stopped tasks grouped by pod instance and classified. A task judged
    /// permanently failed is labeled so in the state store and stays permanent.
    fn recovery_groups(
        &self,
        stopped: Vec<TaskInfo>,
        dirty_assets: &HashSet<String>,
    ) -> Result<Vec<RecoveryGroup>> {
        let mut by_pod: BTreeMap<String, Vec<TaskInfo>> = BTreeMap::new();
        for task in stopped {
            if dirty_assets.contains(&task.name) {
                debug!(task = %task.name, "Task is dirty, skipping recovery");
                continue;
            }
            by_pod.entry(task.pod_instance.clone()).or_default().push(task);
        }

        let mut groups = Vec::with_capacity(by_pod.len());
        for (pod_instance, tasks) in by_pod {
            let mut classified = Vec::with_capacity(tasks.len());
            let mut permanent = false;
            for task in tasks {
                if task.is_permanently_failed() {
                    permanent = true;
                    classified.push(task);
                } else if self.failure_monitor.has_failed(&task) {
                    warn!(task = %task.name, task_id = %task.task_id, "Marking task permanently failed");
                    let labeled = task.mark_permanently_failed();
                    self.state_store.store_tasks(&[labeled.clone()])?;
                    permanent = true;
                    classified.push(labeled);
                } else {
                    classified.push(task);
                }
            }

            let group = RecoveryGroup {
                pod_instance,
                tasks: classified,
                recovery_type: if permanent {
                    RecoveryType::Permanent
                } else {
                    RecoveryType::Transient
                },
            };
            if dirty_assets.contains(&group.step_name()) {
                debug!(step = %group.step_name(), "Pod is dirty, skipping recovery");
                continue;
            }
            groups.push(group);
        }
        Ok(groups)
    }
}

impl PlanManager for RecoveryPlanManager {
    fn plan(&self) -> Arc<Plan> {
        Arc::clone(&self.plan.read())
    }

    fn candidates(&self, dirty_assets: &HashSet<String>) -> Result<Vec<Arc<Step>>> {
        let plan = self.refresh(dirty_assets)?;
        let candidates: Vec<Arc<Step>> = plan
            .candidates(dirty_assets)
            .into_iter()
            .filter(|step| {
                let allowed = self.launch_constrainer.can_launch(step.recovery_type());
                if !allowed {
                    info!(
                        step = %step.name(),
                        recovery_type = %step.recovery_type(),
                        "Recovery launch constrained"
                    );
                }
                allowed
            })
            .collect();
        Ok(candidates)
    }

    fn update(&self, status: &TaskStatus) {
        self.plan().update(status);
    }

    fn attach_publisher(&self, publisher: PlanEventPublisher) {
        self.plan().attach_publisher(publisher.clone());
        let _ = self.publisher.set(publisher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Operation, TaskState};
    use crate::plan::Status;
    use crate::recovery::{NeverFailureMonitor, UnconstrainedLaunchConstrainer};
    use crate::state::MemStateStore;

    fn failed_task(store: &MemStateStore, name: &str, pod: &str) -> TaskInfo {
        let task = TaskInfo::new(name, pod);
        store.store_tasks(&[task.clone()]).unwrap();
        store
            .store_status(name, &TaskStatus::new(task.task_id.clone(), TaskState::Failed))
            .unwrap();
        task
    }

    fn manager(store: Arc<MemStateStore>) -> RecoveryPlanManager {
        RecoveryPlanManager::new(
            store,
            Arc::new(UnconstrainedLaunchConstrainer),
            Arc::new(NeverFailureMonitor),
        )
        .with_ordered_recovery()
    }

    #[test]
    fn test_empty_recovery_plan_is_complete() {
        let manager = manager(Arc::new(MemStateStore::new()));
        assert!(manager.candidates(&HashSet::new()).unwrap().is_empty());
        assert_eq!(manager.plan().status(), Status::Complete);
        assert_eq!(manager.name(), plans::RECOVERY_PLAN_NAME);
    }

    #[test]
    fn test_groups_tasks_by_pod() {
        let store = Arc::new(MemStateStore::new());
        failed_task(&store, "world-0-server", "world-0");
        failed_task(&store, "world-0-sidecar", "world-0");
        failed_task(&store, "hello-0-server", "hello-0");
        let manager = manager(store);

        let names: Vec<String> = manager
            .candidates(&HashSet::new())
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["hello-0:[server]", "world-0:[server, sidecar]"]);
        assert_eq!(manager.plan().phases()[0].name(), plans::RECOVERY_PHASE_NAME);
    }

    #[test]
    fn test_dirty_tasks_excluded() {
        let store = Arc::new(MemStateStore::new());
        failed_task(&store, "hello-0-server", "hello-0");
        failed_task(&store, "world-0-server", "world-0");
        let manager = manager(store);

        let dirty: HashSet<String> = ["hello-0:[server]".to_string(), "world-0-server".to_string()]
            .into_iter()
            .collect();
        assert!(manager.candidates(&dirty).unwrap().is_empty());
    }

    #[test]
    fn test_in_flight_step_preserved_across_refresh() {
        let store = Arc::new(MemStateStore::new());
        let task = failed_task(&store, "hello-0-server", "hello-0");
        let manager = manager(store.clone());

        let step = manager.candidates(&HashSet::new()).unwrap().remove(0);
        let relaunched = TaskInfo::new("hello-0-server", "hello-0");
        step.update_offer_status(&[Operation::Launch {
            task: relaunched.clone(),
            transient: false,
        }]);
        store.store_tasks(&[relaunched]).unwrap();
        assert_ne!(task.task_id, step.tracked_task_ids()[0]);

        manager.refresh(&HashSet::new()).unwrap();
        let plan = manager.plan();
        let kept = plan.find_step(None, "hello-0:[server]").unwrap();
        assert!(Arc::ptr_eq(&kept, &step));
        assert_eq!(manager.dirty_assets().len(), 1);
    }

    #[test]
    fn test_permanent_label_classifies_permanent() {
        let store = Arc::new(MemStateStore::new());
        let task = failed_task(&store, "hello-0-server", "hello-0");
        store.store_tasks(&[task.mark_permanently_failed()]).unwrap();
        let manager = manager(store);

        let candidates = manager.candidates(&HashSet::new()).unwrap();
        assert_eq!(candidates[0].recovery_type(), RecoveryType::Permanent);
    }
}
