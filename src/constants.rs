//! # System Constants
//!
//! Well-known plan names, label keys, event names and default timings shared
//! across the scheduler.

/// Well-known plan and phase names.
pub mod plans {
    pub const DEPLOY_PLAN_NAME: &str = "deploy";
    pub const RECOVERY_PLAN_NAME: &str = "recovery";
    /// The recovery plan is rebuilt around a single phase with this name.
    pub const RECOVERY_PHASE_NAME: &str = "default";
}

/// Task label keys understood by the core.
pub mod labels {
    /// Set to `"true"` when an operator (or a failure monitor) declares a task lost for good.
    pub const PERMANENTLY_FAILED: &str = "permanently-failed";
    /// Records which goal the task was launched with (`RUNNING`, `FINISH`, `ONCE`).
    pub const GOAL_STATE: &str = "goal-state";
}

/// Event names published on the plan status channel.
pub mod events {
    pub const STEP_STATUS_CHANGED: &str = "step.status_changed";
    pub const PLAN_INTERRUPTED: &str = "plan.interrupted";
    pub const PLAN_PROCEEDED: &str = "plan.proceeded";
    pub const PHASE_INTERRUPTED: &str = "phase.interrupted";
    pub const PHASE_PROCEEDED: &str = "phase.proceeded";
    pub const CANARY_APPROVED: &str = "phase.canary_approved";
    pub const RECOVERY_PLAN_REBUILT: &str = "recovery.plan_rebuilt";
}

/// Default timings, mirrored in `config/scheduler-config.yaml`.
pub mod defaults {
    /// Offers declined because the scheduler was not ready are refused briefly.
    pub const SHORT_DECLINE_SECONDS: u64 = 5;
    /// Offers nobody wanted are refused for a long interval.
    pub const LONG_DECLINE_SECONDS: u64 = 1_209_600;
    pub const OFFER_QUEUE_SIZE: usize = 100;
    pub const KILL_RETRY_INTERVAL_MS: u64 = 5_000;
    pub const REVIVE_CAPACITY: u32 = 256;
    pub const REVIVE_REFILL_INTERVAL_MS: u64 = 5_000;
    pub const REVIVE_POLL_INTERVAL_MS: u64 = 1_000;
    pub const PERMANENT_FAILURE_TIMEOUT_SECS: u64 = 20 * 60;
    pub const DELAY_BETWEEN_PERMANENT_RECOVERIES_SECS: u64 = 10 * 60;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1_000;
    pub const RECONCILE_BASE_BACKOFF_MS: u64 = 4_000;
    pub const RECONCILE_MAX_BACKOFF_MS: u64 = 30_000;
    /// Kill attempts for one task after which every resend is logged at warn.
    pub const KILL_ATTEMPTS_WARN_THRESHOLD: u32 = 10;
}

/// Separator between a task name and the unique suffix of its task id.
pub const TASK_ID_SEPARATOR: &str = "__";
