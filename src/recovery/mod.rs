//! # Recovery
//!
//! Relaunching stopped tasks. The recovery plan is rebuilt from the state store
//! on every offer cycle; failure monitors escalate long-stopped tasks to
//! permanent recovery and launch constrainers limit how quickly recoveries run.

pub mod constrain;
pub mod manager;
pub mod monitor;

pub use constrain::{
    from_config, LaunchConstrainer, TimedLaunchConstrainer, TokenBucketLaunchConstrainer,
    UnconstrainedLaunchConstrainer,
};
pub use manager::RecoveryPlanManager;
pub use monitor::{FailureMonitor, NeverFailureMonitor, TimedFailureMonitor};
