//! Launch constrainers gate how often recovery steps may relaunch tasks.

use crate::config::{LaunchConstrainerMode, RecoveryConfig};
use crate::models::{Operation, RecoveryType};
use crate::resilience::TokenBucket;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Rate limit on recovery launches.
///
/// `launch_happened` is the only mutating call and is made exactly once per
/// launch that was actually performed.
pub trait LaunchConstrainer: Send + Sync + fmt::Debug {
    fn can_launch(&self, recovery_type: RecoveryType) -> bool;

    fn launch_happened(&self, operation: &Operation, recovery_type: RecoveryType);
}

/// Build the constrainer selected in configuration. The token bucket variant
/// shares `bucket` with the revive manager.
pub fn from_config(config: &RecoveryConfig, bucket: Arc<TokenBucket>) -> Arc<dyn LaunchConstrainer> {
    match config.launch_constrainer {
        LaunchConstrainerMode::Unthrottled => Arc::new(UnconstrainedLaunchConstrainer),
        LaunchConstrainerMode::TokenBucket => Arc::new(TokenBucketLaunchConstrainer::new(
            bucket,
            config.throttle_transient,
        )),
        LaunchConstrainerMode::Timed => Arc::new(TimedLaunchConstrainer::new(
            config.min_delay_between_permanent_recoveries(),
        )),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnconstrainedLaunchConstrainer;

impl LaunchConstrainer for UnconstrainedLaunchConstrainer {
    fn can_launch(&self, _recovery_type: RecoveryType) -> bool {
        true
    }

    fn launch_happened(&self, _operation: &Operation, _recovery_type: RecoveryType) {}
}

/// Draws one token per throttled launch from the shared bucket. Permanent
/// recoveries are always throttled; transient ones only when configured.
#[derive(Debug)]
pub struct TokenBucketLaunchConstrainer {
    bucket: Arc<TokenBucket>,
    throttle_transient: bool,
}

impl TokenBucketLaunchConstrainer {
    pub fn new(bucket: Arc<TokenBucket>, throttle_transient: bool) -> Self {
        Self {
            bucket,
            throttle_transient,
        }
    }

    fn is_throttled(&self, recovery_type: RecoveryType) -> bool {
        match recovery_type {
            RecoveryType::Permanent => true,
            RecoveryType::Transient => self.throttle_transient,
            RecoveryType::None => false,
        }
    }
}

impl LaunchConstrainer for TokenBucketLaunchConstrainer {
    fn can_launch(&self, recovery_type: RecoveryType) -> bool {
        !self.is_throttled(recovery_type) || self.bucket.available() > 0
    }

    fn launch_happened(&self, operation: &Operation, recovery_type: RecoveryType) {
        if self.is_throttled(recovery_type) && !self.bucket.try_acquire() {
            debug!(
                operation = operation.kind(),
                recovery_type = %recovery_type,
                "Launch recorded with an empty token bucket"
            );
        }
    }
}

/// Enforces a minimum delay between permanent recoveries
#[derive(Debug)]
pub struct TimedLaunchConstrainer {
    min_delay: Duration,
    last_permanent_launch: Mutex<Option<Instant>>,
}

impl TimedLaunchConstrainer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_permanent_launch: Mutex::new(None),
        }
    }

    pub fn can_launch_at(&self, recovery_type: RecoveryType, now: Instant) -> bool {
        if recovery_type != RecoveryType::Permanent {
            return true;
        }
        match *self.last_permanent_launch.lock() {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_delay,
        }
    }

    pub fn launch_happened_at(&self, recovery_type: RecoveryType, now: Instant) {
        if recovery_type == RecoveryType::Permanent {
            *self.last_permanent_launch.lock() = Some(now);
            info!(
                min_delay_secs = self.min_delay.as_secs(),
                "Permanent recovery launched, delaying the next one"
            );
        }
    }
}

impl LaunchConstrainer for TimedLaunchConstrainer {
    fn can_launch(&self, recovery_type: RecoveryType) -> bool {
        self.can_launch_at(recovery_type, Instant::now())
    }

    fn launch_happened(&self, _operation: &Operation, recovery_type: RecoveryType) {
        self.launch_happened_at(recovery_type, Instant::now());
    }
}
