//! # Plans
//!
//! The plan tree (plan, phase, step), the strategies that pick which
//! children proceed, and the machinery that hands offers to eligible steps:
//! plan managers, the coordinator and the plan scheduler.
//!
//! ## Usage
//!
//! ```rust
//! use offer_scheduler::plan::strategy::SerialStrategy;
//! use offer_scheduler::plan::{Element, Phase, Plan, Status, Step};
//! use std::sync::Arc;
//!
//! let hello = Arc::new(Phase::new(
//!     "hello",
//!     vec![Arc::new(Step::new("hello-0:[server]", None).with_status(Status::Complete))],
//!     Arc::new(SerialStrategy),
//! ));
//! let plan = Plan::new("deploy", vec![hello], Arc::new(SerialStrategy));
//! assert_eq!(plan.status(), Status::Complete);
//! ```

pub mod coordinator;
pub mod element;
pub mod info;
pub mod manager;
pub mod phase;
#[allow(clippy::module_inception)]
pub mod plan;
pub mod queries;
pub mod scheduler;
pub mod status;
pub mod step;
pub mod strategy;

pub use coordinator::PlanCoordinator;
pub use element::Element;
pub use info::{PhaseInfo, PlanInfo, StepInfo};
pub use manager::{DefaultPlanManager, PlanManager};
pub use phase::Phase;
pub use plan::Plan;
pub use scheduler::PlanScheduler;
pub use status::{aggregate_status, Status};
pub use step::{InstanceStatus, Step};
pub use strategy::Strategy;
