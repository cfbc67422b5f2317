pub mod publisher;

pub use publisher::{PlanEvent, PlanEventPublisher};
