//! Explicit task reconciliation after registration.
//!
//! The state store may hold tasks whose state the cluster manager has since
//! changed while the scheduler was away. Until every stored non-terminal task
//! has reported back, launches would be planned against stale state, so the
//! scheduler declines offers while reconciliation is outstanding.

use super::driver::DriverSession;
use crate::config::ReconciliationConfig;
use crate::error::Result;
use crate::models::{TaskId, TaskStatus};
use crate::state::StateStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug)]
struct Outstanding {
    unreconciled: HashMap<TaskId, TaskStatus>,
    last_request: Option<Instant>,
    backoff: Duration,
}

pub struct Reconciler {
    session: DriverSession,
    state_store: Arc<dyn StateStore>,
    base_backoff: Duration,
    max_backoff: Duration,
    outstanding: Mutex<Outstanding>,
    complete: AtomicBool,
}

impl Reconciler {
    pub fn new(
        session: DriverSession,
        state_store: Arc<dyn StateStore>,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            session,
            state_store,
            base_backoff: config.base_backoff(),
            max_backoff: config.max_backoff(),
            outstanding: Mutex::new(Outstanding {
                unreconciled: HashMap::new(),
                last_request: None,
                backoff: config.base_backoff(),
            }),
            complete: AtomicBool::new(false),
        }
    }

    /// Collect every stored task with a non-terminal status and reset the
    /// request backoff. Returns how many tasks are awaiting a status.
    pub fn start(&self) -> Result<usize> {
        let mut found = HashMap::new();
        for task in self.state_store.fetch_tasks()? {
            let Some(status) = self.state_store.fetch_status(&task.name)? else {
                continue;
            };
            if status.task_id == task.task_id && !status.is_terminal() {
                found.insert(status.task_id.clone(), status);
            }
        }

        let mut outstanding = self.outstanding.lock();
        outstanding.unreconciled.extend(found);
        outstanding.last_request = None;
        outstanding.backoff = self.base_backoff;
        if !outstanding.unreconciled.is_empty() {
            self.complete.store(false, Ordering::Release);
        }
        info!(
            unreconciled = outstanding.unreconciled.len(),
            "Starting explicit reconciliation"
        );
        Ok(outstanding.unreconciled.len())
    }

    pub fn reconcile(&self) -> Result<()> {
        self.reconcile_at(Instant::now())
    }

    /// Ask the cluster manager for the state of every unreconciled task, unless
    /// the previous request is younger than the current backoff. Each request
    /// doubles the backoff up to the configured maximum.
    pub fn reconcile_at(&self, now: Instant) -> Result<()> {
        if self.complete.load(Ordering::Acquire) {
            return Ok(());
        }

        let request: Vec<TaskStatus> = {
            let mut outstanding = self.outstanding.lock();
            if outstanding.unreconciled.is_empty() {
                Vec::new()
            } else {
                if let Some(last) = outstanding.last_request {
                    let elapsed = now.saturating_duration_since(last);
                    if elapsed < outstanding.backoff {
                        debug!(
                            remaining_ms = (outstanding.backoff - elapsed).as_millis() as u64,
                            "Waiting before the next reconcile request"
                        );
                        return Ok(());
                    }
                }
                outstanding.last_request = Some(now);
                outstanding.backoff = (outstanding.backoff * 2).min(self.max_backoff);
                let mut statuses: Vec<TaskStatus> =
                    outstanding.unreconciled.values().cloned().collect();
                statuses.sort_by(|a, b| a.task_id.cmp(&b.task_id));
                statuses
            }
        };

        if request.is_empty() {
            self.complete.store(true, Ordering::Release);
            info!("✅ Explicit reconciliation complete");
            return Ok(());
        }

        info!(tasks = request.len(), "Requesting explicit reconciliation");
        self.session.driver()?.reconcile_tasks(&request)
    }

    /// A status arrived for the task, so it no longer needs reconciling
    pub fn update(&self, status: &TaskStatus) {
        let mut outstanding = self.outstanding.lock();
        if outstanding.unreconciled.remove(&status.task_id).is_some() {
            debug!(
                task_id = %status.task_id,
                remaining = outstanding.unreconciled.len(),
                "Task reconciled"
            );
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.outstanding.lock().unreconciled.is_empty()
    }

    pub fn remaining(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.outstanding.lock().unreconciled.keys().cloned().collect();
        ids.sort();
        ids
    }
}
