//! The service scheduler ties the plan coordinator to the cluster callbacks:
//! registration, offer batches and task status updates.

use super::driver::{ClusterDriver, DriverSession};
use super::offer_processor::{OfferHandler, OfferProcessor};
use super::reconciler::Reconciler;
use super::revive::ReviveManager;
use super::task_killer::TaskKiller;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::events::PlanEventPublisher;
use crate::models::{Offer, OfferId, TaskStatus};
use crate::offer::{DefaultOfferAccepter, OfferAccepter, OfferEvaluator};
use crate::plan::{PlanCoordinator, PlanManager, PlanScheduler};
use crate::recovery::{
    self, FailureMonitor, NeverFailureMonitor, RecoveryPlanManager, TimedFailureMonitor,
};
use crate::resilience::TokenBucket;
use crate::state::StateStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Assembles a [`ServiceScheduler`] from configuration and the pluggable collaborators
pub struct ServiceSchedulerBuilder {
    config: SchedulerConfig,
    state_store: Arc<dyn StateStore>,
    evaluator: Arc<dyn OfferEvaluator>,
    accepter: Option<Arc<dyn OfferAccepter>>,
    session: DriverSession,
    plan_managers: Vec<Arc<dyn PlanManager>>,
    ordered_recovery: bool,
}

impl ServiceSchedulerBuilder {
    pub fn new(
        config: SchedulerConfig,
        state_store: Arc<dyn StateStore>,
        evaluator: Arc<dyn OfferEvaluator>,
    ) -> Self {
        Self {
            config,
            state_store,
            evaluator,
            accepter: None,
            session: DriverSession::new(),
            plan_managers: Vec::new(),
            ordered_recovery: false,
        }
    }

    /// Add a plan manager. Managers get offers in the order they are added,
    /// and all of them before the recovery manager.
    pub fn with_plan_manager(mut self, manager: Arc<dyn PlanManager>) -> Self {
        self.plan_managers.push(manager);
        self
    }

    pub fn with_session(mut self, session: DriverSession) -> Self {
        self.session = session;
        self
    }

    pub fn with_accepter(mut self, accepter: Arc<dyn OfferAccepter>) -> Self {
        self.accepter = Some(accepter);
        self
    }

    /// Recover stopped pods in name order rather than shuffled
    pub fn with_ordered_recovery(mut self) -> Self {
        self.ordered_recovery = true;
        self
    }

    pub fn build(self) -> Result<Arc<ServiceScheduler>> {
        self.config.validate()?;

        let bucket = Arc::new(TokenBucket::from_config(&self.config.revive));
        let revive = Arc::new(ReviveManager::new(self.session.clone(), Arc::clone(&bucket)));
        let task_killer = Arc::new(TaskKiller::new(self.session.clone()));
        let reconciler = Arc::new(Reconciler::new(
            self.session.clone(),
            Arc::clone(&self.state_store),
            &self.config.reconciliation,
        ));

        let constrainer = recovery::from_config(&self.config.recovery, bucket);
        let monitor: Arc<dyn FailureMonitor> = match self.config.recovery.permanent_failure_timeout() {
            Some(timeout) => Arc::new(TimedFailureMonitor::new(timeout)),
            None => Arc::new(NeverFailureMonitor),
        };
        let mut recovery_manager =
            RecoveryPlanManager::new(Arc::clone(&self.state_store), constrainer, monitor);
        if self.ordered_recovery {
            recovery_manager = recovery_manager.with_ordered_recovery();
        }
        let recovery_manager = Arc::new(recovery_manager);

        let accepter = self.accepter.unwrap_or_else(|| {
            Arc::new(DefaultOfferAccepter::new(
                self.session.clone(),
                Arc::clone(&self.state_store),
            ))
        });
        let plan_scheduler = PlanScheduler::new(
            self.evaluator,
            accepter,
            Arc::clone(&self.state_store),
            Arc::clone(&task_killer),
        );

        let mut managers = self.plan_managers;
        managers.push(recovery_manager.clone() as Arc<dyn PlanManager>);
        let publisher = PlanEventPublisher::new(self.config.events.channel_capacity);
        let coordinator = Arc::new(PlanCoordinator::new(managers, plan_scheduler, publisher));

        Ok(Arc::new(ServiceScheduler {
            config: self.config,
            session: self.session,
            state_store: self.state_store,
            coordinator,
            task_killer,
            reconciler,
            revive,
            recovery: recovery_manager,
            ready: AtomicBool::new(false),
            kill_loop_shutdown: Arc::new(Notify::new()),
            revive_loop_shutdown: Arc::new(Notify::new()),
            background: Mutex::new(Vec::new()),
        }))
    }
}

pub struct ServiceScheduler {
    config: SchedulerConfig,
    session: DriverSession,
    state_store: Arc<dyn StateStore>,
    coordinator: Arc<PlanCoordinator>,
    task_killer: Arc<TaskKiller>,
    reconciler: Arc<Reconciler>,
    revive: Arc<ReviveManager>,
    recovery: Arc<RecoveryPlanManager>,
    ready: AtomicBool,
    kill_loop_shutdown: Arc<Notify>,
    revive_loop_shutdown: Arc<Notify>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceScheduler {
    pub fn coordinator(&self) -> &Arc<PlanCoordinator> {
        &self.coordinator
    }

    pub fn task_killer(&self) -> &Arc<TaskKiller> {
        &self.task_killer
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn revive_manager(&self) -> &Arc<ReviveManager> {
        &self.revive
    }

    pub fn recovery_manager(&self) -> &Arc<RecoveryPlanManager> {
        &self.recovery
    }

    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.state_store
    }

    pub fn session(&self) -> &DriverSession {
        &self.session
    }

    /// The cluster manager accepted the framework. Offers are processed once
    /// every stored live task has been reconciled.
    pub fn registered(&self, driver: Arc<dyn ClusterDriver>) -> Result<()> {
        self.session.set_driver(driver);
        let unreconciled = self.reconciler.start()?;
        if let Err(e) = self.reconciler.reconcile() {
            warn!(error = %e, "Reconcile request failed, retrying with the next offers");
        }
        self.ready.store(true, Ordering::Release);
        self.revive.request_revive();
        let resent = self.task_killer.kill_all_tasks();
        info!(
            outstanding_kills = resent,
            unreconciled,
            "✅ Scheduler registered"
        );
        Ok(())
    }

    /// Apply a task status update.
    ///
    /// Repeated "unknown task" statuses for tasks being killed are dropped. A
    /// status for a task the state store does not know under this id belongs
    /// to a stale launch and the task is killed.
    #[instrument(skip_all, fields(task_id = %status.task_id, state = %status.state))]
    pub fn status_update(&self, status: &TaskStatus) -> Result<()> {
        self.reconciler.update(status);
        if !self.task_killer.update(status) {
            debug!("Ignoring repeated unknown-task status for a task being killed");
            return Ok(());
        }

        let stored = match status.task_id.task_name() {
            Some(name) => self
                .state_store
                .fetch_task(name)?
                .filter(|task| task.task_id == status.task_id),
            None => None,
        };
        let Some(task) = stored else {
            if !status.is_terminal() {
                warn!("Status for a task that is not in the state store, killing it");
                self.task_killer.kill_task(&status.task_id)?;
            } else {
                debug!("Terminal status for an untracked task");
            }
            return Ok(());
        };

        self.state_store.store_status(&task.name, status)?;
        self.coordinator.update(status);

        if status.is_terminal() {
            // A stopped task is new recovery work.
            self.revive.request_revive();
        }
        Ok(())
    }

    /// Spawn the kill retry and revive loops and start the offer worker.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> OfferProcessor {
        let kill_loop = Arc::clone(&self.task_killer).spawn_retry_loop(
            self.config.task_killer.retry_interval(),
            Arc::clone(&self.kill_loop_shutdown),
        );
        let revive_loop = Arc::clone(&self.revive).spawn_revive_loop(
            self.config.revive.poll_interval(),
            Arc::clone(&self.revive_loop_shutdown),
        );
        self.background.lock().extend([kill_loop, revive_loop]);

        info!("🚀 Service scheduler started");
        OfferProcessor::start(
            Arc::clone(self) as Arc<dyn OfferHandler>,
            self.session.clone(),
            &self.config.offers,
        )
    }

    /// Stop the background loops
    pub async fn shutdown(&self) {
        self.kill_loop_shutdown.notify_one();
        self.revive_loop_shutdown.notify_one();
        let handles: Vec<JoinHandle<()>> = self.background.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background loop ended abnormally");
            }
        }
        info!("Service scheduler stopped");
    }
}

impl OfferHandler for ServiceScheduler {
    /// Registered and reconciled. While tasks are unreconciled each call
    /// resends the reconcile request once its backoff has passed.
    fn is_ready(&self) -> bool {
        if !self.ready.load(Ordering::Acquire) {
            return false;
        }
        if let Err(e) = self.reconciler.reconcile() {
            warn!(error = %e, "Reconcile request failed");
        }
        self.reconciler.is_reconciled()
    }

    fn process_offers(&self, offers: &[Offer]) -> Vec<OfferId> {
        self.revive.notify_offers_received();
        let accepted = self.coordinator.process_offers(offers);
        if let Err(e) = self
            .revive
            .notify_offers_needed(self.coordinator.has_operations())
        {
            warn!(error = %e, "Failed to update offer suppression");
        }
        accepted
    }
}
