//! Fixtures shared by the integration tests: a recording cluster driver, a
//! cpu-counting offer evaluator and plan builders.
#![allow(dead_code)]

use offer_scheduler::framework::{ClusterDriver, DriverSession, TaskKiller};
use offer_scheduler::models::{
    Offer, OfferId, OfferRecommendation, Operation, ResourceRequirement, TaskId, TaskInfo, TaskState,
    TaskStatus,
};
use offer_scheduler::offer::{DefaultOfferAccepter, OfferEvaluator};
use offer_scheduler::plan::strategy::{SerialStrategy, Strategy};
use offer_scheduler::plan::{Phase, Plan, PlanCoordinator, PlanManager, PlanScheduler, Status, Step};
use offer_scheduler::state::{MemStateStore, StateStore};
use offer_scheduler::{PlanEventPublisher, Result, SchedulerError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Accept {
        offers: Vec<OfferId>,
        operations: Vec<Operation>,
    },
    Decline {
        offer: OfferId,
        refuse_seconds: u64,
    },
    Kill(TaskId),
    Reconcile(Vec<TaskId>),
    Revive,
    Suppress,
}

/// Cluster driver that records every call and succeeds unless told otherwise
#[derive(Default)]
pub struct RecordingDriver {
    calls: Mutex<Vec<DriverCall>>,
    fail_kills: AtomicBool,
    reject_accepts: AtomicBool,
}

impl RecordingDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    pub fn fail_kills(&self) {
        self.fail_kills.store(true, Ordering::Release);
    }

    /// Fail every accept call while `reject` is set
    pub fn reject_accepts(&self, reject: bool) {
        self.reject_accepts.store(reject, Ordering::Release);
    }

    pub fn launched_tasks(&self) -> Vec<TaskInfo> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Accept { operations, .. } => Some(operations),
                _ => None,
            })
            .flatten()
            .filter_map(|op| op.launched_task().cloned())
            .collect()
    }

    pub fn kills(&self) -> Vec<TaskId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Kill(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn reconciles(&self) -> Vec<Vec<TaskId>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Reconcile(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn declines(&self) -> Vec<(OfferId, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Decline {
                    offer,
                    refuse_seconds,
                } => Some((offer, refuse_seconds)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &DriverCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }
}

impl ClusterDriver for RecordingDriver {
    fn accept_offers(&self, offer_ids: &[OfferId], operations: &[Operation]) -> Result<()> {
        if self.reject_accepts.load(Ordering::Acquire) {
            return Err(SchedulerError::Driver("accept rejected".to_string()));
        }
        self.calls.lock().push(DriverCall::Accept {
            offers: offer_ids.to_vec(),
            operations: operations.to_vec(),
        });
        Ok(())
    }

    fn decline_offer(&self, offer_id: &OfferId, refuse_seconds: u64) -> Result<()> {
        self.calls.lock().push(DriverCall::Decline {
            offer: offer_id.clone(),
            refuse_seconds,
        });
        Ok(())
    }

    fn kill_task(&self, task_id: &TaskId) -> Result<()> {
        if self.fail_kills.load(Ordering::Acquire) {
            return Err(SchedulerError::Driver("kill rejected".to_string()));
        }
        self.calls.lock().push(DriverCall::Kill(task_id.clone()));
        Ok(())
    }

    fn reconcile_tasks(&self, statuses: &[TaskStatus]) -> Result<()> {
        let ids = statuses.iter().map(|s| s.task_id.clone()).collect();
        self.calls.lock().push(DriverCall::Reconcile(ids));
        Ok(())
    }

    fn revive_offers(&self) -> Result<()> {
        self.calls.lock().push(DriverCall::Revive);
        Ok(())
    }

    fn suppress_offers(&self) -> Result<()> {
        self.calls.lock().push(DriverCall::Suppress);
        Ok(())
    }
}

/// Launches every task of a requirement on the first offer holding
/// `cpus_per_task` cpus for each of them.
pub struct ScalarEvaluator {
    pub cpus_per_task: f64,
}

impl Default for ScalarEvaluator {
    fn default() -> Self {
        Self { cpus_per_task: 1.0 }
    }
}

impl OfferEvaluator for ScalarEvaluator {
    fn evaluate(
        &self,
        requirement: &ResourceRequirement,
        offers: &[Offer],
    ) -> Result<Vec<OfferRecommendation>> {
        let needed = self.cpus_per_task * requirement.tasks_to_launch.len() as f64;
        let Some(offer) = offers.iter().find(|offer| offer.scalar("cpus") >= needed) else {
            return Ok(Vec::new());
        };
        Ok(requirement
            .task_instance_names()
            .into_iter()
            .map(|name| {
                let mut task = TaskInfo::new(name, &requirement.pod_instance);
                task.agent_id = Some(offer.agent_id.clone());
                OfferRecommendation::launch(offer, task)
            })
            .collect())
    }
}

/// Evaluator that always fails
pub struct FailingEvaluator;

impl OfferEvaluator for FailingEvaluator {
    fn evaluate(&self, _: &ResourceRequirement, _: &[Offer]) -> Result<Vec<OfferRecommendation>> {
        Err(SchedulerError::Evaluation("matcher unavailable".to_string()))
    }
}

pub fn offer(id: &str, cpus: f64) -> Offer {
    Offer::new(id, format!("agent-{id}")).with_scalar("cpus", cpus)
}

/// A launchable step for `<pod>` running one `server` task
pub fn pod_step(pod: &str) -> Arc<Step> {
    Arc::new(Step::from_requirement(ResourceRequirement::new(pod, ["server"])))
}

pub fn status_step(name: &str, status: Status) -> Arc<Step> {
    Arc::new(Step::new(name, None).with_status(status))
}

pub fn phase(name: &str, pods: &[&str], strategy: Arc<dyn Strategy>) -> Arc<Phase> {
    Arc::new(Phase::new(
        name,
        pods.iter().map(|pod| pod_step(pod)).collect(),
        strategy,
    ))
}

pub fn plan(name: &str, phases: Vec<Arc<Phase>>) -> Arc<Plan> {
    Arc::new(Plan::new(name, phases, Arc::new(SerialStrategy)))
}

/// Everything a coordinator needs, wired to one recording driver and one store
pub struct Harness {
    pub driver: Arc<RecordingDriver>,
    pub session: DriverSession,
    pub store: Arc<MemStateStore>,
    pub task_killer: Arc<TaskKiller>,
}

impl Harness {
    pub fn new() -> Self {
        let driver = RecordingDriver::new();
        let session = DriverSession::connected(driver.clone());
        Self {
            task_killer: Arc::new(TaskKiller::new(session.clone())),
            driver,
            session,
            store: Arc::new(MemStateStore::new()),
        }
    }

    pub fn plan_scheduler(&self, evaluator: Arc<dyn OfferEvaluator>) -> PlanScheduler {
        PlanScheduler::new(
            evaluator,
            Arc::new(DefaultOfferAccepter::new(
                self.session.clone(),
                self.store.clone(),
            )),
            self.store.clone(),
            self.task_killer.clone(),
        )
    }

    pub fn coordinator(&self, managers: Vec<Arc<dyn PlanManager>>) -> PlanCoordinator {
        PlanCoordinator::new(
            managers,
            self.plan_scheduler(Arc::new(ScalarEvaluator::default())),
            PlanEventPublisher::default(),
        )
    }

    /// Record a task as launched and stopped with `state`
    pub fn stopped_task(&self, name: &str, pod: &str, state: TaskState) -> TaskInfo {
        let task = TaskInfo::new(name, pod);
        self.store.store_tasks(&[task.clone()]).unwrap();
        self.store
            .store_status(name, &TaskStatus::new(task.task_id.clone(), state))
            .unwrap();
        task
    }
}

pub fn running(task: &TaskInfo) -> TaskStatus {
    TaskStatus::new(task.task_id.clone(), TaskState::Running)
}

pub fn failed(task: &TaskInfo) -> TaskStatus {
    TaskStatus::new(task.task_id.clone(), TaskState::Failed)
}
