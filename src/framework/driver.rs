//! Cluster manager calls and the injectable session that carries them.

use crate::error::{Result, SchedulerError};
use crate::models::{OfferId, Operation, TaskId, TaskStatus};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Calls the scheduler makes against the cluster manager. Implementations are
/// fire-and-forget: success means the call was sent, not that it took effect.
pub trait ClusterDriver: Send + Sync {
    fn accept_offers(&self, offer_ids: &[OfferId], operations: &[Operation]) -> Result<()>;

    fn decline_offer(&self, offer_id: &OfferId, refuse_seconds: u64) -> Result<()>;

    fn kill_task(&self, task_id: &TaskId) -> Result<()>;

    /// Ask the cluster manager to resend the current status of these tasks
    fn reconcile_tasks(&self, statuses: &[TaskStatus]) -> Result<()>;

    fn revive_offers(&self) -> Result<()>;

    fn suppress_offers(&self) -> Result<()>;
}

/// Shared handle to the current driver, set once the scheduler registers.
///
/// Cloning shares the slot, so every component sees the same connection.
#[derive(Clone, Default)]
pub struct DriverSession {
    driver: Arc<RwLock<Option<Arc<dyn ClusterDriver>>>>,
}

impl DriverSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(driver: Arc<dyn ClusterDriver>) -> Self {
        let session = Self::new();
        session.set_driver(driver);
        session
    }

    pub fn set_driver(&self, driver: Arc<dyn ClusterDriver>) {
        *self.driver.write() = Some(driver);
        info!("🔌 Cluster driver registered");
    }

    pub fn disconnect(&self) {
        *self.driver.write() = None;
        info!("Cluster driver disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.driver.read().is_some()
    }

    /// The current driver, or `NotConnected` before registration
    pub fn driver(&self) -> Result<Arc<dyn ClusterDriver>> {
        self.driver
            .read()
            .clone()
            .ok_or_else(|| SchedulerError::NotConnected("driver session has no driver".to_string()))
    }
}

impl fmt::Debug for DriverSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSession")
            .field("connected", &self.is_connected())
            .finish()
    }
}
