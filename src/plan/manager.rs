//! Plan managers expose one plan's candidates to the coordinator.

use super::{Element, Plan, Step};
use crate::error::Result;
use crate::events::PlanEventPublisher;
use crate::models::TaskStatus;
use std::collections::HashSet;
use std::sync::Arc;

pub trait PlanManager: Send + Sync {
    /// The plan as of now. Managers that rebuild their plan return the latest build.
    fn plan(&self) -> Arc<Plan>;

    fn name(&self) -> String {
        self.plan().name().to_string()
    }

    /// Steps eligible for this offer cycle, skipping anything in `dirty_assets`
    fn candidates(&self, dirty_assets: &HashSet<String>) -> Result<Vec<Arc<Step>>>;

    /// Names of the steps this manager has in flight
    fn dirty_assets(&self) -> HashSet<String> {
        self.plan().dirty_assets()
    }

    fn update(&self, status: &TaskStatus) {
        self.plan().update(status);
    }

    fn attach_publisher(&self, publisher: PlanEventPublisher) {
        self.plan().attach_publisher(publisher);
    }
}

/// Manager over a fixed plan
#[derive(Debug)]
pub struct DefaultPlanManager {
    plan: Arc<Plan>,
}

impl DefaultPlanManager {
    pub fn new(plan: Arc<Plan>) -> Self {
        Self { plan }
    }
}

impl PlanManager for DefaultPlanManager {
    fn plan(&self) -> Arc<Plan> {
        Arc::clone(&self.plan)
    }

    fn candidates(&self, dirty_assets: &HashSet<String>) -> Result<Vec<Arc<Step>>> {
        Ok(self.plan.candidates(dirty_assets))
    }
}
