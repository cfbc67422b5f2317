//! # Offer Matching Contracts
//!
//! The resource-matching algorithm is external to the scheduling core. The
//! core asks an [`OfferEvaluator`] for recommendations and applies them
//! through an [`OfferAccepter`].

use crate::error::Result;
use crate::framework::DriverSession;
use crate::models::{Offer, OfferId, OfferRecommendation, ResourceRequirement, TaskInfo, TaskStatus};
use crate::state::StateStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Turns a requirement plus the available offers into recommended operations
pub trait OfferEvaluator: Send + Sync {
    fn evaluate(
        &self,
        requirement: &ResourceRequirement,
        offers: &[Offer],
    ) -> Result<Vec<OfferRecommendation>>;
}

/// Applies recommendations against the cluster and reports the offers consumed
pub trait OfferAccepter: Send + Sync {
    fn accept(&self, recommendations: &[OfferRecommendation]) -> Result<Vec<OfferId>>;
}

/// Sends one accept call per agent and records launched tasks in the state store
pub struct DefaultOfferAccepter {
    session: DriverSession,
    state_store: Arc<dyn StateStore>,
}

impl DefaultOfferAccepter {
    pub fn new(session: DriverSession, state_store: Arc<dyn StateStore>) -> Self {
        Self {
            session,
            state_store,
        }
    }
}

impl OfferAccepter for DefaultOfferAccepter {
    fn accept(&self, recommendations: &[OfferRecommendation]) -> Result<Vec<OfferId>> {
        if recommendations.is_empty() {
            return Ok(Vec::new());
        }
        let driver = self.session.driver()?;

        let mut by_agent: BTreeMap<&str, Vec<&OfferRecommendation>> = BTreeMap::new();
        for recommendation in recommendations {
            by_agent
                .entry(recommendation.agent_id.as_str())
                .or_default()
                .push(recommendation);
        }

        let mut accepted = Vec::new();
        for (agent_id, group) in by_agent {
            let offer_ids: Vec<OfferId> = group
                .iter()
                .map(|r| r.offer_id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let operations: Vec<_> = group.iter().map(|r| r.operation.clone()).collect();

            // Record launches before they happen so status updates always find their task.
            let launched: Vec<TaskInfo> = group
                .iter()
                .filter_map(|r| r.operation.launched_task().cloned())
                .collect();
            let replaced = self.snapshot(&launched)?;
            if !launched.is_empty() {
                self.state_store.store_tasks(&launched)?;
            }

            match driver.accept_offers(&offer_ids, &operations) {
                Ok(()) => {
                    info!(
                        agent_id = %agent_id,
                        offers = offer_ids.len(),
                        operations = operations.len(),
                        "✅ Accepted offers"
                    );
                    accepted.extend(offer_ids);
                }
                Err(e) => {
                    error!(agent_id = %agent_id, error = %e, "Failed to accept offers");
                    self.restore(replaced);
                }
            }
        }
        Ok(accepted)
    }
}

/// Stored record of a task about to be replaced by a launch
struct ReplacedTask {
    name: String,
    task: Option<TaskInfo>,
    status: Option<TaskStatus>,
}

impl DefaultOfferAccepter {
    fn snapshot(&self, launched: &[TaskInfo]) -> Result<Vec<ReplacedTask>> {
        launched
            .iter()
            .map(|task| {
                Ok(ReplacedTask {
                    name: task.name.clone(),
                    task: self.state_store.fetch_task(&task.name)?,
                    status: self.state_store.fetch_status(&task.name)?,
                })
            })
            .collect()
    }

    /// Put back what a rejected launch overwrote, so a stopped task still needs recovery
    fn restore(&self, replaced: Vec<ReplacedTask>) {
        for ReplacedTask { name, task, status } in replaced {
            let restored = match task {
                Some(task) => self.state_store.store_tasks(&[task]).and_then(|()| match &status {
                    Some(status) => self.state_store.store_status(&name, status),
                    None => Ok(()),
                }),
                None => self.state_store.clear_task(&name),
            };
            if let Err(e) = restored {
                warn!(task = %name, error = %e, "Could not restore task after rejected launch");
            }
        }
    }
}
