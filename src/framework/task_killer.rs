//! Deduplicated kill requests with a loop break for tasks the cluster has forgotten.

use super::driver::DriverSession;
use crate::constants::defaults::KILL_ATTEMPTS_WARN_THRESHOLD;
use crate::error::Result;
use crate::models::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
struct KillRequest {
    requested_at: DateTime<Utc>,
    attempts: u32,
}

/// Ledger of kill requests, retried until the cluster reports the task terminal
#[derive(Debug)]
pub struct TaskKiller {
    session: DriverSession,
    ledger: DashMap<TaskId, KillRequest>,
}

impl TaskKiller {
    pub fn new(session: DriverSession) -> Self {
        Self {
            session,
            ledger: DashMap::new(),
        }
    }

    /// Record a kill request and send one kill immediately.
    ///
    /// Fails with `NotConnected` when no driver is registered; the request is
    /// not queued in that case.
    pub fn kill_task(&self, task_id: &TaskId) -> Result<()> {
        if task_id.is_empty() {
            warn!("Ignoring kill request for an empty task id");
            return Ok(());
        }

        let driver = self.session.driver()?;
        {
            let mut request = self.ledger.entry(task_id.clone()).or_insert_with(|| KillRequest {
                requested_at: Utc::now(),
                attempts: 0,
            });
            request.attempts += 1;
        }
        info!(task_id = %task_id, "🔪 Killing task");
        driver.kill_task(task_id)
    }

    /// Re-send a kill for every id still on the ledger. Returns the number of kills sent.
    pub fn kill_all_tasks(&self) -> usize {
        let driver = match self.session.driver() {
            Ok(driver) => driver,
            Err(e) => {
                warn!(error = %e, pending = self.ledger.len(), "Cannot retry kills");
                return 0;
            }
        };

        let task_ids: Vec<TaskId> = self.ledger.iter().map(|entry| entry.key().clone()).collect();
        let mut sent = 0;
        for task_id in task_ids {
            if let Some(mut request) = self.ledger.get_mut(&task_id) {
                request.attempts += 1;
                if request.attempts > KILL_ATTEMPTS_WARN_THRESHOLD {
                    warn!(
                        task_id = %task_id,
                        attempts = request.attempts,
                        requested_at = %request.requested_at,
                        "Kill still unconfirmed, retrying"
                    );
                } else {
                    debug!(
                        task_id = %task_id,
                        attempts = request.attempts,
                        requested_at = %request.requested_at,
                        "Retrying kill"
                    );
                }
            }
            match driver.kill_task(&task_id) {
                Ok(()) => sent += 1,
                Err(e) => error!(task_id = %task_id, error = %e, "Kill retry failed"),
            }
        }
        sent
    }

    /// Apply a status update to the ledger. Returns `false` when the caller
    /// should not act on the status further.
    ///
    /// A terminal status saying the cluster does not know a task we asked to
    /// kill is swallowed and the request is kept; any other terminal status
    /// clears the request.
    pub fn update(&self, status: &TaskStatus) -> bool {
        if !status.is_terminal() {
            return true;
        }

        if status.is_unknown_task() && self.ledger.contains_key(&status.task_id) {
            info!(
                task_id = %status.task_id,
                state = %status.state,
                "Cluster does not know a task pending kill, ignoring status"
            );
            return false;
        }

        if let Some((task_id, request)) = self.ledger.remove(&status.task_id) {
            info!(
                task_id = %task_id,
                state = %status.state,
                attempts = request.attempts,
                "Kill confirmed"
            );
        }
        true
    }

    pub fn is_kill_requested(&self, task_id: &TaskId) -> bool {
        self.ledger.contains_key(task_id)
    }

    pub fn pending_kills(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.ledger.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Kill sends so far for a task still on the ledger
    pub fn attempts(&self, task_id: &TaskId) -> Option<u32> {
        self.ledger.get(task_id).map(|request| request.attempts)
    }

    /// Tasks whose kill has been sent more often than the warn threshold
    /// without a terminal status other than "unknown task"
    pub fn unconfirmed_kills(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .ledger
            .iter()
            .filter(|entry| entry.value().attempts > KILL_ATTEMPTS_WARN_THRESHOLD)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Periodically re-send outstanding kills until `shutdown` is notified
    pub fn spawn_retry_loop(self: Arc<Self>, interval: Duration, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        debug!("Task killer retry loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !self.ledger.is_empty() {
                            self.kill_all_tasks();
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use crate::framework::ClusterDriver;
    use crate::models::{OfferId, Operation, StatusReason, TaskState};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct KillRecorder {
        kills: Mutex<Vec<TaskId>>,
    }

    impl ClusterDriver for KillRecorder {
        fn accept_offers(&self, _: &[OfferId], _: &[Operation]) -> Result<()> {
            Ok(())
        }
        fn decline_offer(&self, _: &OfferId, _: u64) -> Result<()> {
            Ok(())
        }
        fn kill_task(&self, task_id: &TaskId) -> Result<()> {
            self.kills.lock().push(task_id.clone());
            Ok(())
        }
        fn reconcile_tasks(&self, _: &[TaskStatus]) -> Result<()> {
            Ok(())
        }
        fn revive_offers(&self) -> Result<()> {
            Ok(())
        }
        fn suppress_offers(&self) -> Result<()> {
            Ok(())
        }
    }

    fn killer() -> (TaskKiller, Arc<KillRecorder>) {
        let driver = Arc::new(KillRecorder::default());
        let killer = TaskKiller::new(DriverSession::connected(driver.clone()));
        (killer, driver)
    }

    #[test]
    fn test_kill_without_driver_fails_fast() {
        let killer = TaskKiller::new(DriverSession::new());
        let err = killer.kill_task(&TaskId::new("a__1")).unwrap_err();
        assert!(matches!(err, SchedulerError::NotConnected(_)));
        assert!(killer.pending_kills().is_empty());
    }

    #[test]
    fn test_kill_and_retry() {
        let (killer, driver) = killer();
        let id = TaskId::new("a__1");
        killer.kill_task(&id).unwrap();
        killer.kill_task(&id).unwrap();
        assert_eq!(killer.pending_kills(), vec![id.clone()]);
        assert_eq!(killer.kill_all_tasks(), 1);
        assert_eq!(driver.kills.lock().len(), 3);
    }

    #[test]
    fn test_empty_id_is_noop() {
        let (killer, driver) = killer();
        killer.kill_task(&TaskId::new("")).unwrap();
        assert!(driver.kills.lock().is_empty());
    }

    #[test]
    fn test_terminal_status_clears_request() {
        let (killer, _) = killer();
        let id = TaskId::new("a__1");
        killer.kill_task(&id).unwrap();
        assert!(killer.update(&TaskStatus::new(id.clone(), TaskState::Running)));
        assert!(killer.is_kill_requested(&id));
        assert!(killer.update(&TaskStatus::new(id.clone(), TaskState::Killed)));
        assert!(!killer.is_kill_requested(&id));
    }

    #[test]
    fn test_unknown_task_loop_break() {
        let (killer, _) = killer();
        let id = TaskId::new("a__1");
        killer.kill_task(&id).unwrap();

        let unknown = TaskStatus::new(id.clone(), TaskState::Lost).with_reason(StatusReason::Reconciliation);
        assert!(!killer.update(&unknown));
        assert!(killer.is_kill_requested(&id));
        assert!(!killer.update(&unknown));

        assert!(killer.update(&TaskStatus::new(id.clone(), TaskState::Killed)));
        assert!(!killer.is_kill_requested(&id));
        assert!(killer.update(&unknown));
    }

    #[test]
    fn test_forgotten_task_flagged_after_repeated_retries() {
        let (killer, driver) = killer();
        let id = TaskId::new("a__1");
        killer.kill_task(&id).unwrap();
        let unknown = TaskStatus::new(id.clone(), TaskState::Unknown);
        assert!(!killer.update(&unknown));

        for _ in 0..KILL_ATTEMPTS_WARN_THRESHOLD {
            killer.kill_all_tasks();
        }
        assert_eq!(killer.attempts(&id), Some(KILL_ATTEMPTS_WARN_THRESHOLD + 1));
        assert_eq!(killer.unconfirmed_kills(), vec![id.clone()]);
        assert_eq!(driver.kills.lock().len() as u32, KILL_ATTEMPTS_WARN_THRESHOLD + 1);

        assert!(killer.update(&TaskStatus::new(id.clone(), TaskState::Killed)));
        assert!(killer.unconfirmed_kills().is_empty());
        assert_eq!(killer.attempts(&id), None);
    }

    #[tokio::test]
    async fn test_retry_loop_resends_until_shutdown() {
        let (killer, driver) = killer();
        let killer = Arc::new(killer);
        killer.kill_task(&TaskId::new("a__1")).unwrap();

        let shutdown = Arc::new(Notify::new());
        let handle = Arc::clone(&killer).spawn_retry_loop(Duration::from_millis(10), Arc::clone(&shutdown));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.notify_one();
        handle.await.unwrap();

        assert!(driver.kills.lock().len() >= 2);
    }
}
