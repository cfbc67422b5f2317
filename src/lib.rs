#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Offer Scheduler
//!
//! Plan-driven reconciliation core for services running on an offer-based
//! cluster resource manager.
//!
//! ## Overview
//!
//! A service's desired state is described as plans (plan → phase → step). Each
//! time the cluster manager offers resources, the [`plan::PlanCoordinator`]
//! walks its plan managers in priority order, collects the steps allowed to
//! proceed, and hands them the unclaimed offers. Task status updates flow back
//! into the steps that launched them, and stopped tasks are picked up by the
//! recovery plan, which is rebuilt on every pass.
//!
//! ## Module Organization
//!
//! - [`plan`] - Plan tree, strategies, coordinator and admin queries
//! - [`recovery`] - Recovery plan manager, failure monitors, launch constrainers
//! - [`framework`] - Driver session, offer ingestion, task killer, revive manager
//! - [`offer`] - Offer evaluation and acceptance contracts
//! - [`state`] - Task and status persistence contract
//! - [`models`] - Tasks, offers, operations and requirements
//! - [`config`] - Layered configuration
//! - [`events`] - Plan status event channel
//! - [`resilience`] - Token bucket rate limiting
//!
//! ## Quick Start
//!
//! ```rust
//! use offer_scheduler::plan::strategy::{ParallelStrategy, SerialStrategy};
//! use offer_scheduler::plan::{DefaultPlanManager, Element, Phase, Plan, PlanManager, Step};
//! use offer_scheduler::models::ResourceRequirement;
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! let steps = (0..2)
//!     .map(|i| {
//!         let requirement = ResourceRequirement::new(format!("hello-{i}"), ["server"]);
//!         Arc::new(Step::from_requirement(requirement))
//!     })
//!     .collect();
//! let phase = Arc::new(Phase::new("hello", steps, Arc::new(ParallelStrategy)));
//! let manager = DefaultPlanManager::new(Arc::new(Plan::new(
//!     "deploy",
//!     vec![phase],
//!     Arc::new(SerialStrategy),
//! )));
//!
//! let candidates = manager.candidates(&HashSet::new()).unwrap();
//! assert_eq!(candidates.len(), 2);
//! assert_eq!(candidates[0].name(), "hello-0:[server]");
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod framework;
pub mod logging;
pub mod models;
pub mod offer;
pub mod plan;
pub mod recovery;
pub mod resilience;
pub mod state;

pub use config::{ConfigManager, SchedulerConfig};
pub use error::{Result, SchedulerError};
pub use events::{PlanEvent, PlanEventPublisher};
pub use framework::{
    ClusterDriver, DriverSession, OfferHandler, OfferProcessor, ServiceScheduler,
    ServiceSchedulerBuilder, TaskKiller,
};
pub use models::{
    Offer, OfferId, OfferRecommendation, Operation, RecoveryType, ResourceRequirement, TaskId,
    TaskInfo, TaskState, TaskStatus,
};
pub use offer::{DefaultOfferAccepter, OfferAccepter, OfferEvaluator};
pub use plan::{
    DefaultPlanManager, Element, Phase, Plan, PlanCoordinator, PlanManager, PlanScheduler, Status,
    Step,
};
pub use recovery::RecoveryPlanManager;
pub use state::{MemStateStore, StateStore};
