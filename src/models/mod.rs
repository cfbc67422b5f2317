//! # Domain Models
//!
//! Value types exchanged between the scheduling core and its collaborators:
//! tasks and their status updates, offers and the operations recommended
//! against them, and the resource requirements steps ask for.

pub mod offer;
pub mod requirement;
pub mod task;

pub use offer::{Offer, OfferId, OfferRecommendation, Operation};
pub use requirement::{RecoveryType, ResourceRequirement};
pub use task::{GoalState, StatusReason, TaskId, TaskInfo, TaskState, TaskStatus};
