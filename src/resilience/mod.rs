//! # Resilience Module
//!
//! Rate limiting shared across the scheduler. The token bucket throttles both
//! recovery relaunches and revive calls so a crash-looping task cannot flood
//! the cluster manager.
//!
//! ## Usage
//!
//! ```rust
//! use offer_scheduler::resilience::TokenBucket;
//! use std::time::Duration;
//!
//! let bucket = TokenBucket::new(2, 2, Duration::from_secs(5));
//! assert!(bucket.try_acquire());
//! assert!(bucket.try_acquire());
//! assert!(!bucket.try_acquire());
//! ```

pub mod token_bucket;

pub use token_bucket::TokenBucket;
