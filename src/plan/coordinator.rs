//! Arbitrates one offer batch across every plan manager.

use super::{Element, Plan, PlanManager, PlanScheduler};
use crate::events::{PlanEvent, PlanEventPublisher};
use crate::logging::log_offer_operation;
use crate::models::{Offer, OfferId, TaskStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

/// Runs plan managers in priority order over a shrinking offer pool.
///
/// Earlier managers get first pick of offers and of assets. An asset claimed by
/// one manager in a pass is never handed to a later manager in the same pass.
pub struct PlanCoordinator {
    managers: Vec<Arc<dyn PlanManager>>,
    scheduler: PlanScheduler,
    publisher: PlanEventPublisher,
}

impl PlanCoordinator {
    pub fn new(
        managers: Vec<Arc<dyn PlanManager>>,
        scheduler: PlanScheduler,
        publisher: PlanEventPublisher,
    ) -> Self {
        for manager in &managers {
            manager.attach_publisher(publisher.clone());
        }
        info!(
            managers = ?managers.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "Plan coordinator initialized"
        );
        Self {
            managers,
            scheduler,
            publisher,
        }
    }

    pub fn managers(&self) -> &[Arc<dyn PlanManager>] {
        &self.managers
    }

    pub fn manager(&self, name: &str) -> Option<Arc<dyn PlanManager>> {
        self.managers.iter().find(|m| m.name() == name).cloned()
    }

    pub fn plans(&self) -> Vec<Arc<Plan>> {
        self.managers.iter().map(|m| m.plan()).collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.publisher.subscribe()
    }

    /// One offer-processing pass. Returns the ids of the offers consumed; the
    /// caller declines the rest.
    #[instrument(skip_all, fields(offers = offers.len()))]
    pub fn process_offers(&self, offers: &[Offer]) -> Vec<OfferId> {
        let mut remaining: Vec<Offer> = offers.to_vec();
        let mut consumed: Vec<OfferId> = Vec::new();

        let global_dirty: HashSet<String> = self
            .managers
            .iter()
            .flat_map(|manager| manager.dirty_assets())
            .collect();
        let mut claimed_this_pass: HashSet<String> = HashSet::new();

        for manager in &self.managers {
            let name = manager.name();
            let own_dirty = manager.dirty_assets();
            let relevant_dirty: HashSet<String> = global_dirty
                .union(&claimed_this_pass)
                .filter(|asset| !own_dirty.contains(*asset))
                .cloned()
                .collect();

            let candidates = match manager.candidates(&relevant_dirty) {
                Ok(candidates) => candidates,
                Err(e) => {
                    error!(plan = %name, error = %e, "Plan manager failed to produce candidates, skipping");
                    continue;
                }
            };
            debug!(
                plan = %name,
                dirty = ?relevant_dirty,
                candidates = ?candidates.iter().map(|s| s.name()).collect::<Vec<_>>(),
                "Evaluating plan candidates"
            );

            if !candidates.is_empty() && !remaining.is_empty() {
                let accepted = self.scheduler.resource_offers(&remaining, &candidates);
                if !accepted.is_empty() {
                    let accepted_set: HashSet<&OfferId> = accepted.iter().collect();
                    remaining.retain(|offer| !accepted_set.contains(&offer.id));
                    consumed.extend(accepted);
                }
            }

            claimed_this_pass.extend(manager.dirty_assets());
        }

        log_offer_operation(
            "process_offers",
            offers.len(),
            Some(&format!("{} consumed", consumed.len())),
        );
        consumed
    }

    /// Whether any plan still has work to do
    pub fn has_operations(&self) -> bool {
        self.managers.iter().any(|m| !m.plan().is_complete())
    }

    /// Forward a status update to every manager
    pub fn update(&self, status: &TaskStatus) {
        for manager in &self.managers {
            manager.update(status);
        }
    }
}
