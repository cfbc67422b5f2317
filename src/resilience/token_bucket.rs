//! # Token Bucket
//!
//! Global rate limit shared by recovery launches and revive calls. A single
//! instance is handed to every component that must agree on the rate.

use crate::config::ReviveConfig;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Fixed-capacity bucket refilled with one token per interval.
///
/// An interval of zero disables throttling: every acquire succeeds.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, initial_tokens: u32, refill_interval: Duration) -> Self {
        let capacity = capacity.max(1);
        info!(
            capacity = capacity,
            initial_tokens = initial_tokens.min(capacity),
            refill_interval_ms = refill_interval.as_millis() as u64,
            "🪣 Token bucket initialized"
        );
        Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: initial_tokens.min(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &ReviveConfig) -> Self {
        Self::new(
            config.capacity,
            config.initial_tokens,
            config.refill_interval(),
        )
    }

    /// A bucket that never throttles
    pub fn unthrottled() -> Self {
        Self::new(1, 1, Duration::ZERO)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    pub fn is_unthrottled(&self) -> bool {
        self.refill_interval.is_zero()
    }

    /// Take one token if available. Never blocks on time.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Same as [`try_acquire`](Self::try_acquire) against an explicit clock reading.
    /// Readings earlier than the last refill are treated as no elapsed time.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        if self.is_unthrottled() {
            return true;
        }

        let mut state = self.state.lock();
        self.refill(&mut state, now);
        if state.tokens == 0 {
            debug!(capacity = self.capacity, "Token bucket empty");
            return false;
        }
        state.tokens -= 1;
        true
    }

    /// Tokens currently available, after accounting for elapsed refills
    pub fn available(&self) -> u32 {
        self.available_at(Instant::now())
    }

    pub fn available_at(&self, now: Instant) -> u32 {
        if self.is_unthrottled() {
            return self.capacity;
        }
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let intervals = elapsed.as_nanos() / self.refill_interval.as_nanos();
        if intervals == 0 {
            return;
        }

        if state.tokens >= self.capacity {
            // A full bucket does not bank time toward future tokens.
            state.last_refill = now;
            return;
        }

        let added = u32::try_from(intervals).unwrap_or(u32::MAX);
        state.tokens = state.tokens.saturating_add(added).min(self.capacity);
        if state.tokens >= self.capacity {
            state.last_refill = now;
        } else {
            // Keep the partial interval so refill cadence stays exact.
            state.last_refill += self.refill_interval * added;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_until_empty() {
        let bucket = TokenBucket::new(3, 3, Duration::from_secs(60));
        let start = Instant::now();
        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));
        assert_eq!(bucket.available_at(start), 0);
    }

    #[test]
    fn test_refill_one_per_interval() {
        let bucket = TokenBucket::new(5, 0, Duration::from_secs(10));
        let start = Instant::now();
        assert!(!bucket.try_acquire_at(start));
        let later = start + Duration::from_secs(10) + Duration::from_millis(1);
        assert!(bucket.try_acquire_at(later));
        assert!(!bucket.try_acquire_at(later));
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let bucket = TokenBucket::new(2, 0, Duration::from_secs(1));
        let much_later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(bucket.available_at(much_later), 2);
    }

    #[test]
    fn test_zero_interval_is_unthrottled() {
        let bucket = TokenBucket::new(1, 0, Duration::ZERO);
        assert!(bucket.is_unthrottled());
        for _ in 0..100 {
            assert!(bucket.try_acquire());
        }
    }

    #[test]
    fn test_initial_tokens_clamped() {
        let bucket = TokenBucket::new(2, 10, Duration::from_secs(60));
        assert_eq!(bucket.available_at(Instant::now()), 2);
    }

    #[test]
    fn test_concurrent_acquire_never_double_spends() {
        let bucket = Arc::new(TokenBucket::new(50, 50, Duration::from_secs(3600)));
        let acquired = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                let acquired = Arc::clone(&acquired);
                thread::spawn(move || {
                    for _ in 0..20 {
                        if bucket.try_acquire() {
                            acquired.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(acquired.load(Ordering::SeqCst), 50);
    }
}
