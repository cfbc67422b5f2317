//! Group of steps sharing one strategy.

use super::strategy::{self, Strategy};
use super::{aggregate_status, Element, Status, Step};
use crate::constants::events;
use crate::events::PlanEventPublisher;
use crate::models::TaskStatus;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};
use uuid::Uuid;

pub struct Phase {
    id: Uuid,
    name: String,
    steps: Vec<Arc<Step>>,
    strategy: Arc<dyn Strategy>,
    interrupted: AtomicBool,
    errors: Mutex<Vec<String>>,
    publisher: OnceLock<PlanEventPublisher>,
}

impl Phase {
    pub fn new(name: impl Into<String>, steps: Vec<Arc<Step>>, strategy: Arc<dyn Strategy>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps,
            strategy,
            interrupted: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            publisher: OnceLock::new(),
        }
    }

    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<Arc<Step>> {
        self.steps.iter().find(|s| s.name() == name).cloned()
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn attach_publisher(&self, publisher: PlanEventPublisher) {
        for step in &self.steps {
            step.attach_publisher(publisher.clone());
        }
        let _ = self.publisher.set(publisher);
    }

    /// Steps the phase strategy allows to proceed
    pub fn candidates(&self, dirty_assets: &HashSet<String>) -> Vec<Arc<Step>> {
        if self.interrupted.load(Ordering::Acquire) {
            return Vec::new();
        }
        let candidates = strategy::candidates(self.strategy.as_ref(), &self.steps, dirty_assets);
        debug!(
            phase = %self.name,
            strategy = self.strategy.name(),
            candidates = ?candidates.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Selected phase candidates"
        );
        candidates
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        info!(phase = %self.name, "Phase interrupted");
        self.publish(events::PHASE_INTERRUPTED);
    }

    pub fn proceed(&self) {
        self.interrupted.store(false, Ordering::Release);
        info!(phase = %self.name, "Phase proceeding");
        self.publish(events::PHASE_PROCEEDED);
    }

    pub(crate) fn inherit_interrupt(&self, previous: &Phase) {
        self.interrupted
            .store(previous.interrupted.load(Ordering::Acquire), Ordering::Release);
    }

    /// Release one more step held by a canary strategy
    pub fn approve(&self) -> bool {
        let views: Vec<&dyn Element> = self.steps.iter().map(|s| s.as_ref() as &dyn Element).collect();
        let approved = self.strategy.approve(&views);
        if approved {
            self.publish(events::CANARY_APPROVED);
        }
        approved
    }

    pub fn add_error(&self, error: impl Into<String>) {
        self.errors.lock().push(error.into());
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_complete()).count()
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

impl Element for Phase {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        let statuses: Vec<Status> = self.steps.iter().map(|s| s.status()).collect();
        aggregate_status(
            &self.name,
            &statuses,
            !self.errors.lock().is_empty(),
            self.is_interrupted(),
        )
    }

    fn errors(&self) -> Vec<String> {
        let mut errors = self.errors.lock().clone();
        for step in &self.steps {
            errors.extend(step.errors());
        }
        errors
    }

    fn update(&self, status: &TaskStatus) {
        for step in &self.steps {
            step.update(status);
        }
    }

    fn restart(&self) {
        info!(phase = %self.name, steps = self.steps.len(), "Restarting phase");
        for step in &self.steps {
            step.restart();
        }
    }

    fn force_complete(&self) {
        info!(phase = %self.name, steps = self.steps.len(), "Forcing phase completion");
        for step in &self.steps {
            step.force_complete();
        }
    }

    fn is_interrupted(&self) -> bool {
        if self.interrupted.load(Ordering::Acquire) {
            return true;
        }
        let views: Vec<&dyn Element> = self.steps.iter().map(|s| s.as_ref() as &dyn Element).collect();
        self.strategy.awaiting_approval(&views)
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("strategy", &self.strategy.name())
            .field("steps", &self.steps)
            .finish()
    }
}
