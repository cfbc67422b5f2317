//! Matches candidate steps against the unclaimed offers of one pass.

use super::{Element, Step};
use crate::error::Result;
use crate::framework::TaskKiller;
use crate::models::{Offer, OfferId, Operation, ResourceRequirement};
use crate::offer::{OfferAccepter, OfferEvaluator};
use crate::state::StateStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub struct PlanScheduler {
    evaluator: Arc<dyn OfferEvaluator>,
    accepter: Arc<dyn OfferAccepter>,
    state_store: Arc<dyn StateStore>,
    task_killer: Arc<TaskKiller>,
}

impl PlanScheduler {
    pub fn new(
        evaluator: Arc<dyn OfferEvaluator>,
        accepter: Arc<dyn OfferAccepter>,
        state_store: Arc<dyn StateStore>,
        task_killer: Arc<TaskKiller>,
    ) -> Self {
        Self {
            evaluator,
            accepter,
            state_store,
            task_killer,
        }
    }

    /// Offer the steps, in order, whatever offers earlier steps left behind.
    /// Returns the ids of every offer consumed.
    #[instrument(skip_all, fields(offers = offers.len(), steps = steps.len()))]
    pub fn resource_offers(&self, offers: &[Offer], steps: &[Arc<Step>]) -> Vec<OfferId> {
        let mut remaining: Vec<Offer> = offers.to_vec();
        let mut consumed = Vec::new();

        // Steps past the last usable offer still get an (empty) outcome.
        for step in steps {
            let accepted = self.resource_offers_for_step(&remaining, step);
            if accepted.is_empty() {
                continue;
            }
            let accepted_set: HashSet<&OfferId> = accepted.iter().collect();
            remaining.retain(|offer| !accepted_set.contains(&offer.id));
            consumed.extend(accepted);
        }
        consumed
    }

    fn resource_offers_for_step(&self, offers: &[Offer], step: &Step) -> Vec<OfferId> {
        let status = step.status();
        if !status.accepts_offers() {
            info!(step = %step.name(), status = %status, "Skipping step, not pending");
            return Vec::new();
        }

        let Some(requirement) = step.start() else {
            debug!(step = %step.name(), "Step has no requirement, nothing to match");
            step.update_offer_status(&[]);
            return Vec::new();
        };

        if let Err(e) = self.kill_stale_instances(&requirement) {
            error!(step = %step.name(), error = %e, "Could not kill stale instances, not relaunching");
            step.update_offer_status(&[]);
            return Vec::new();
        }

        let recommendations = match self.evaluator.evaluate(&requirement, offers) {
            Ok(recommendations) => recommendations,
            Err(e) => {
                error!(step = %step.name(), error = %e, "Offer evaluation failed");
                step.update_offer_status(&[]);
                return Vec::new();
            }
        };
        if recommendations.is_empty() {
            info!(step = %step.name(), offers = offers.len(), "No offer satisfies step requirement");
            step.update_offer_status(&[]);
            return Vec::new();
        }

        let accepted = match self.accepter.accept(&recommendations) {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(step = %step.name(), error = %e, "Failed to accept recommendations");
                step.update_offer_status(&[]);
                return Vec::new();
            }
        };

        let accepted_set: HashSet<&OfferId> = accepted.iter().collect();
        let applied: Vec<Operation> = recommendations
            .iter()
            .filter(|r| accepted_set.contains(&r.offer_id))
            .map(|r| r.operation.clone())
            .collect();
        step.update_offer_status(&applied);
        accepted
    }

    /// Kill previously launched instances of the requirement's tasks that may still be alive
    fn kill_stale_instances(&self, requirement: &ResourceRequirement) -> Result<()> {
        for name in requirement.task_instance_names() {
            let Some(task) = self.state_store.fetch_task(&name)? else {
                continue;
            };
            let alive = self
                .state_store
                .fetch_status(&name)?
                .map_or(true, |status| status.task_id != task.task_id || !status.is_terminal());
            if alive {
                warn!(task = %name, task_id = %task.task_id, "Killing stale instance before relaunch");
                self.task_killer.kill_task(&task.task_id)?;
            }
        }
        Ok(())
    }
}
