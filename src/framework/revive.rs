//! Revive and suppress signaling, throttled by the shared token bucket.

use super::driver::DriverSession;
use crate::error::Result;
use crate::resilience::TokenBucket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug)]
pub struct ReviveManager {
    session: DriverSession,
    bucket: Arc<TokenBucket>,
    revive_requested: AtomicBool,
    suppressed: AtomicBool,
}

impl ReviveManager {
    pub fn new(session: DriverSession, bucket: Arc<TokenBucket>) -> Self {
        Self {
            session,
            bucket,
            revive_requested: AtomicBool::new(false),
            suppressed: AtomicBool::new(false),
        }
    }

    /// New schedulable work appeared; a revive is owed
    pub fn request_revive(&self) {
        if !self.revive_requested.swap(true, Ordering::AcqRel) {
            debug!("Revive requested");
        }
    }

    pub fn is_revive_requested(&self) -> bool {
        self.revive_requested.load(Ordering::Acquire)
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Acquire)
    }

    /// Send a revive if one is owed and the bucket has a token.
    ///
    /// The owed flag is cleared either way: a throttled request is dropped,
    /// and the next `request_revive` tries again. Returns whether a revive was sent.
    pub fn revive_if_requested(&self) -> Result<bool> {
        if !self.revive_requested.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        if !self.bucket.try_acquire() {
            info!("Revive throttled by token bucket, dropping request");
            return Ok(false);
        }

        let sent = self.session.driver().and_then(|driver| driver.revive_offers());
        match sent {
            Ok(()) => {
                info!("📣 Revived offers");
                Ok(true)
            }
            Err(e) => {
                // Nothing reached the cluster; keep the request for the next poll.
                self.revive_requested.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Suppress offers when no work needs them, and ask for a revive when work returns.
    /// Repeated calls with the same value issue at most one suppress.
    pub fn notify_offers_needed(&self, needed: bool) -> Result<()> {
        if needed {
            if self.is_suppressed() {
                self.request_revive();
            }
            return Ok(());
        }

        if self.suppressed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.session.driver().and_then(|driver| driver.suppress_offers()) {
            Ok(()) => {
                info!("🔇 Suppressed offers, no pending work");
                Ok(())
            }
            Err(e) => {
                self.suppressed.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Offers are flowing again, so they are no longer suppressed
    pub fn notify_offers_received(&self) {
        if self.suppressed.swap(false, Ordering::AcqRel) {
            debug!("Offers received while suppressed, clearing suppression");
        }
    }

    /// Poll for owed revives until `shutdown` is notified
    pub fn spawn_revive_loop(self: Arc<Self>, poll_interval: Duration, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        debug!("Revive loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.revive_if_requested() {
                            error!(error = %e, "Revive failed");
                        }
                    }
                }
            }
        })
    }
}
