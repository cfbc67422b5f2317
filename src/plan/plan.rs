//! Top-level deployable unit: ordered phases under one strategy.

use super::strategy::{self, Strategy};
use super::{aggregate_status, Element, Phase, Status, Step};
use crate::constants::events;
use crate::events::PlanEventPublisher;
use crate::logging::log_plan_operation;
use crate::models::TaskStatus;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::info;
use uuid::Uuid;

pub struct Plan {
    id: Uuid,
    name: String,
    phases: Vec<Arc<Phase>>,
    strategy: Arc<dyn Strategy>,
    interrupted: AtomicBool,
    errors: Mutex<Vec<String>>,
    publisher: OnceLock<PlanEventPublisher>,
}

impl Plan {
    pub fn new(name: impl Into<String>, phases: Vec<Arc<Phase>>, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            phases,
            strategy,
            interrupted: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            publisher: OnceLock::new(),
        }
    }

    pub fn with_errors(self, errors: Vec<String>) -> Self {
        self.errors.lock().extend(errors);
        self
    }

    pub fn phases(&self) -> &[Arc<Phase>] {
        &self.phases
    }

    pub fn phase(&self, name: &str) -> Option<Arc<Phase>> {
        self.phases.iter().find(|p| p.name() == name).cloned()
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    /// Every step in declared order
    pub fn steps(&self) -> impl Iterator<Item = &Arc<Step>> {
        self.phases.iter().flat_map(|phase| phase.steps().iter())
    }

    /// Step lookup by name, optionally restricted to one phase
    pub fn find_step(&self, phase: Option<&str>, step: &str) -> Option<Arc<Step>> {
        self.phases
            .iter()
            .filter(|p| phase.map_or(true, |name| p.name() == name))
            .find_map(|p| p.step(step))
    }

    pub fn attach_publisher(&self, publisher: PlanEventPublisher) {
        for phase in &self.phases {
            phase.attach_publisher(publisher.clone());
        }
        let _ = self.publisher.set(publisher);
    }

    /// Candidate phases chosen by the plan strategy, then candidate steps chosen
    /// by each phase's strategy, flattened in order. An interrupted plan has none.
    pub fn candidates(&self, dirty_assets: &HashSet<String>) -> Vec<Arc<Step>> {
        if self.is_interrupted() {
            return Vec::new();
        }
        strategy::candidates(self.strategy.as_ref(), &self.phases, dirty_assets)
            .iter()
            .flat_map(|phase| phase.candidates(dirty_assets))
            .collect()
    }

    /// Names of every step currently in flight
    pub fn dirty_assets(&self) -> HashSet<String> {
        self.steps()
            .filter(|step| step.is_running())
            .map(|step| step.name().to_string())
            .collect()
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        log_plan_operation("interrupt", &self.name, self.status().as_str(), None);
        self.publish(events::PLAN_INTERRUPTED);
    }

    pub fn proceed(&self) {
        self.interrupted.store(false, Ordering::Release);
        log_plan_operation("proceed", &self.name, self.status().as_str(), None);
        self.publish(events::PLAN_PROCEEDED);
    }

    pub fn add_error(&self, error: impl Into<String>) {
        self.errors.lock().push(error.into());
    }

    /// Take over operator interrupts from the plan this one replaces, phase by phase
    pub fn inherit_interrupts(&self, previous: &Plan) {
        self.interrupted
            .store(previous.interrupted.load(Ordering::Acquire), Ordering::Release);
        for phase in &self.phases {
            if let Some(old) = previous.phase(phase.name()) {
                phase.inherit_interrupt(&old);
            }
        }
    }

    pub fn total_steps(&self) -> usize {
        self.phases.iter().map(|p| p.total_steps()).sum()
    }

    pub fn completed_steps(&self) -> usize {
        self.phases.iter().map(|p| p.completed_steps()).sum()
    }

    fn publish(&self, event: &str) {
        if let Some(publisher) = self.publisher.get() {
            publisher.publish(
                event,
                self.id,
                self.name.clone(),
                self.status(),
                serde_json::Value::Null,
            );
        }
    }
}

impl Element for Plan {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        let statuses: Vec<Status> = self.phases.iter().map(|p| p.status()).collect();
        aggregate_status(
            &self.name,
            &statuses,
            !self.errors.lock().is_empty(),
            self.is_interrupted(),
        )
    }

    fn errors(&self) -> Vec<String> {
        let mut errors = self.errors.lock().clone();
        for phase in &self.phases {
            errors.extend(phase.errors());
        }
        errors
    }

    fn update(&self, status: &TaskStatus) {
        for phase in &self.phases {
            phase.update(status);
        }
    }

    fn restart(&self) {
        info!(plan = %self.name, "Restarting plan");
        for phase in &self.phases {
            phase.restart();
        }
    }

    fn force_complete(&self) {
        info!(plan = %self.name, "Forcing plan completion");
        for phase in &self.phases {
            phase.force_complete();
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("strategy", &self.strategy.name())
            .field("phases", &self.phases)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::strategy::{ParallelStrategy, SerialStrategy};

    fn step(name: &str, status: Status) -> Arc<Step> {
        Arc::new(Step::new(name, None).with_status(status))
    }

    fn hello_world(world_0: Status, world_1: Status) -> Plan {
        let hello = Arc::new(Phase::new(
            "hello",
            vec![step("hello-0", Status::Complete)],
            Arc::new(SerialStrategy),
        ));
        let world = Arc::new(Phase::new(
            "world",
            vec![step("world-0", world_0), step("world-1", world_1)],
            Arc::new(SerialStrategy),
        ));
        Plan::new("deploy", vec![hello, world], Arc::new(SerialStrategy))
    }

    #[test]
    fn test_simple_deploy_counts() {
        let plan = hello_world(Status::InProgress, Status::Pending);
        assert_eq!(plan.status(), Status::InProgress);
        assert_eq!(plan.total_steps(), 3);
        assert_eq!(plan.completed_steps(), 1);
        assert_eq!(
            plan.dirty_assets(),
            ["world-0".to_string()].into_iter().collect::<HashSet<_>>()
        );
    }

    #[test]
    fn test_candidates_follow_nested_strategies() {
        let plan = hello_world(Status::Pending, Status::Pending);
        let candidates = plan.candidates(&HashSet::new());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name(), "world-0");
    }

    #[test]
    fn test_interrupted_plan_offers_nothing() {
        let plan = hello_world(Status::Pending, Status::Pending);
        plan.interrupt();
        assert_eq!(plan.status(), Status::Waiting);
        assert!(plan.candidates(&HashSet::new()).is_empty());
        plan.proceed();
        assert_eq!(plan.status(), Status::InProgress);
    }

    #[test]
    fn test_parallel_plan_unions_phases() {
        let a = Arc::new(Phase::new("a", vec![step("a-0", Status::Pending)], Arc::new(SerialStrategy)));
        let b = Arc::new(Phase::new("b", vec![step("b-0", Status::Pending)], Arc::new(SerialStrategy)));
        let plan = Plan::new("backup", vec![a, b], Arc::new(ParallelStrategy));
        let names: Vec<_> = plan
            .candidates(&HashSet::new())
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["a-0", "b-0"]);
    }

    #[test]
    fn test_find_step() {
        let plan = hello_world(Status::Pending, Status::Pending);
        assert!(plan.find_step(None, "world-1").is_some());
        assert!(plan.find_step(Some("hello"), "world-1").is_none());
        assert!(plan.find_step(Some("world"), "world-1").is_some());
    }

    #[test]
    fn test_plan_errors_force_error() {
        let plan = hello_world(Status::Complete, Status::Complete).with_errors(vec!["bad config".into()]);
        assert_eq!(plan.status(), Status::Error);
        assert_eq!(plan.errors(), vec!["bad config".to_string()]);
    }
}
