//! # Scheduler Configuration
//!
//! Layered configuration for the offer scheduler: a base YAML file, an optional
//! per-environment overlay, and `OFFER_SCHEDULER__*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offer_scheduler::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let queue_size = manager.config().offers.queue_size;
//! let refill = manager.config().revive.refill_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring scheduler-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Offer ingestion and decline behavior
    pub offers: OffersConfig,

    /// Revive/suppress throttling
    pub revive: ReviveConfig,

    /// Recovery plan behavior
    pub recovery: RecoveryConfig,

    /// Task killer retry loop
    pub task_killer: TaskKillerConfig,

    /// Explicit task reconciliation after registration
    pub reconciliation: ReconciliationConfig,

    /// Plan status event channel
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OffersConfig {
    /// Maximum number of queued offers; `0` means unbounded.
    pub queue_size: usize,
    pub short_decline_seconds: u64,
    pub long_decline_seconds: u64,
}

impl Default for OffersConfig {
    fn default() -> Self {
        Self {
            queue_size: defaults::OFFER_QUEUE_SIZE,
            short_decline_seconds: defaults::SHORT_DECLINE_SECONDS,
            long_decline_seconds: defaults::LONG_DECLINE_SECONDS,
        }
    }
}

impl OffersConfig {
    pub fn is_unbounded(&self) -> bool {
        self.queue_size == 0
    }
}

/// Token bucket shared by revive calls and throttled recovery launches
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviveConfig {
    pub capacity: u32,
    pub initial_tokens: u32,
    /// `0` refills the bucket on every acquire (unthrottled).
    pub refill_interval_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ReviveConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::REVIVE_CAPACITY,
            initial_tokens: defaults::REVIVE_CAPACITY,
            refill_interval_ms: defaults::REVIVE_REFILL_INTERVAL_MS,
            poll_interval_ms: defaults::REVIVE_POLL_INTERVAL_MS,
        }
    }
}

impl ReviveConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// How recovery launches are rate limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchConstrainerMode {
    Unthrottled,
    TokenBucket,
    Timed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// A task failed for longer than this is treated as permanently failed.
    /// `0` disables the timed failure monitor.
    pub permanent_failure_timeout_secs: u64,
    pub launch_constrainer: LaunchConstrainerMode,
    /// Minimum spacing between permanent recoveries for the `timed` constrainer.
    pub min_delay_between_permanent_recoveries_secs: u64,
    /// Whether transient relaunches also draw from the token bucket.
    pub throttle_transient: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            permanent_failure_timeout_secs: defaults::PERMANENT_FAILURE_TIMEOUT_SECS,
            launch_constrainer: LaunchConstrainerMode::Timed,
            min_delay_between_permanent_recoveries_secs:
                defaults::DELAY_BETWEEN_PERMANENT_RECOVERIES_SECS,
            throttle_transient: false,
        }
    }
}

impl RecoveryConfig {
    pub fn permanent_failure_timeout(&self) -> Option<Duration> {
        match self.permanent_failure_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn min_delay_between_permanent_recoveries(&self) -> Duration {
        Duration::from_secs(self.min_delay_between_permanent_recoveries_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskKillerConfig {
    pub retry_interval_ms: u64,
}

impl Default for TaskKillerConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: defaults::KILL_RETRY_INTERVAL_MS,
        }
    }
}

impl TaskKillerConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Backoff between explicit reconcile requests: doubles from the base up to the max
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: defaults::RECONCILE_BASE_BACKOFF_MS,
            max_backoff_ms: defaults::RECONCILE_MAX_BACKOFF_MS,
        }
    }
}

impl ReconciliationConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.revive.capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "revive.capacity",
                "0",
                "token bucket capacity must be at least 1",
            ));
        }
        if self.revive.initial_tokens > self.revive.capacity {
            return Err(ConfigurationError::invalid_value(
                "revive.initial_tokens",
                self.revive.initial_tokens.to_string(),
                format!("must not exceed capacity {}", self.revive.capacity),
            ));
        }
        if self.revive.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "revive.poll_interval_ms",
                "0",
                "poll interval must be positive",
            ));
        }
        if self.task_killer.retry_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "task_killer.retry_interval_ms",
                "0",
                "kill retry interval must be positive",
            ));
        }
        if self.reconciliation.max_backoff_ms < self.reconciliation.base_backoff_ms {
            return Err(ConfigurationError::invalid_value(
                "reconciliation.max_backoff_ms",
                self.reconciliation.max_backoff_ms.to_string(),
                format!(
                    "must not be below base_backoff_ms {}",
                    self.reconciliation.base_backoff_ms
                ),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "broadcast channels need a capacity of at least 1",
            ));
        }
        if let Some(timeout) = self.recovery.permanent_failure_timeout() {
            if self.recovery.launch_constrainer == LaunchConstrainerMode::Timed
                && timeout < self.recovery.min_delay_between_permanent_recoveries()
            {
                return Err(ConfigurationError::validation_error(format!(
                    "recovery.permanent_failure_timeout_secs ({}) must not be shorter than \
                     recovery.min_delay_between_permanent_recoveries_secs ({})",
                    self.recovery.permanent_failure_timeout_secs,
                    self.recovery.min_delay_between_permanent_recoveries_secs
                )));
            }
        }
        Ok(())
    }
}
