//! # Framework
//!
//! Everything that talks to the cluster manager: the injectable driver session,
//! offer ingestion, task reconciliation, kill and revive signaling, and the
//! service scheduler that wires them to the plan coordinator.

pub mod driver;
pub mod offer_processor;
pub mod reconciler;
pub mod revive;
pub mod scheduler;
pub mod task_killer;

pub use driver::{ClusterDriver, DriverSession};
pub use offer_processor::{OfferHandler, OfferProcessor};
pub use reconciler::Reconciler;
pub use revive::ReviveManager;
pub use scheduler::{ServiceScheduler, ServiceSchedulerBuilder};
pub use task_killer::TaskKiller;
