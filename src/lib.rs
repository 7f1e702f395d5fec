//! # Sluice - Flow Control Primitives for Request-Serving Infrastructure
//!
//! Three building blocks that decide whether, when and with what resource a
//! request proceeds:
//!
//! - a bounded, blocking FIFO queue for producer/consumer hand-off,
//! - a fixed-size connection pool built on that queue,
//! - a rate limiter with three interchangeable admission policies.
//!
//! Every blocking operation comes in an untimed form, a timed form and a
//! form that takes a [`CancelToken`], so a caller can always get its thread back.
//!
//! ## Quick Start
//!
//! ### Rate Limiting
//!
//! ```rust
//! use sluice::{Policy, RateLimiterBuilder};
//! use std::time::Duration;
//!
//! // At most 2 requests in any 1 second window
//! let limiter = RateLimiterBuilder::new()
//!     .policy(Policy::SlidingWindow)
//!     .max_requests(2)
//!     .window(Duration::from_secs(1))
//!     .build()
//!     .unwrap();
//!
//! assert!(limiter.try_acquire());
//! assert!(limiter.try_acquire());
//! assert!(!limiter.try_acquire());
//!
//! // Blocking acquire with a deadline
//! let err = limiter.acquire_timeout(Duration::from_millis(10)).unwrap_err();
//! assert!(err.is_timeout());
//! ```
//!
//! ### Connection Pooling
//!
//! ```rust
//! use sluice::{ConnectionPool, PoolConfig};
//!
//! let pool = ConnectionPool::new(PoolConfig::new(4)).unwrap();
//! {
//!     // Returned to the pool when the guard drops
//!     let conn = pool.get().unwrap();
//!     assert!(conn.is_valid());
//!     assert_eq!(pool.available_count(), 3);
//! }
//! assert_eq!(pool.available_count(), 4);
//! ```
//!
//! ### Producer/Consumer Hand-off
//!
//! ```rust
//! use sluice::BlockingQueue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(BlockingQueue::new(2).unwrap());
//!
//! let producer = {
//!     let queue = queue.clone();
//!     thread::spawn(move || (1..=5).for_each(|n| queue.put(n)))
//! };
//!
//! let received: Vec<u32> = (0..5).map(|_| queue.take()).collect();
//! producer.join().unwrap();
//! assert_eq!(received, vec![1, 2, 3, 4, 5]);
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Your Application      │
//!                    └──────────┬──────────────┘
//!                               │
//!          ┌────────────────────┼─────────────────────┐
//!          │                    │                     │
//!     ┌────▼────────┐    ┌──────▼─────────┐    ┌──────▼─────────┐
//!     │ RateLimiter │    │ ConnectionPool │    │ BlockingQueue  │
//!     ├─────────────┤    ├────────────────┤    ├────────────────┤
//!     │ fixed       │    │ fixed roster   │    │ bounded FIFO   │
//!     │ sliding     │    │ validity check │    │ two condvars   │
//!     │ token bucket│    │ shutdown       │    │ fair unlock    │
//!     └─────────────┘    └──────┬─────────┘    └────────────────┘
//!                               │  idle handles
//!                               └──────────────► BlockingQueue
//! ```
//!
//! ## Thread Safety
//!
//! All types are `Send + Sync` and meant to be shared via `Arc`. Rate
//! limiters come out of the factory as trait objects; use
//! [`RateLimiterBuilder::build_shared`] for an `Arc<dyn RateLimiter>`.
//!
//! ## Logging
//!
//! State transitions (window rolls, invalid connection replacement, pool
//! shutdown, key eviction) are reported through [`tracing`]. Install any
//! subscriber to see them; nothing is printed otherwise.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

mod cancel;
mod error;
mod pool;
mod queue;
mod rate_limiter;
mod utils;

// Public re-exports
pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use pool::{
    Connection, ConnectionManager, ConnectionPool, DefaultManager, PoolConfig, PoolState,
    PooledConnection, DEFAULT_MAX_CONNECTIONS, DEFAULT_TIMEOUT,
};
pub use queue::{BlockingQueue, PutError};
pub use rate_limiter::{
    create_rate_limiter, HealthStatus, KeyedRateLimiter, ManagerStats, Policy, RateLimiter,
    RateLimiterConfig, RateLimiterMetrics, DEFAULT_CLEANUP_INTERVAL, DEFAULT_INACTIVE_AFTER,
    DEFAULT_MAX_KEYS, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW,
};
pub use utils::monotonic_ms;

use std::sync::Arc;
use std::time::Duration;

/// A rate limiter wrapped in `Arc` for convenient thread-safe sharing.
///
/// # Example
/// ```rust
/// use sluice::{RateLimiterBuilder, SharedRateLimiter};
///
/// let shared: SharedRateLimiter = RateLimiterBuilder::new().build_shared().unwrap();
///
/// // Now you can clone and share across threads
/// let limiter_clone = shared.clone();
/// std::thread::spawn(move || {
///     limiter_clone.try_acquire();
/// })
/// .join()
/// .unwrap();
/// ```
pub type SharedRateLimiter = Arc<dyn RateLimiter>;

/// A connection pool wrapped in `Arc`.
pub type SharedPool<M = DefaultManager> = Arc<ConnectionPool<M>>;

/// A keyed rate limiter wrapped in `Arc`, as needed by
/// [`KeyedRateLimiter::start_stoppable_cleanup_thread`].
pub type SharedKeyedLimiter<K> = Arc<KeyedRateLimiter<K>>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// Import everything you need with a single line:
/// ```rust
/// use sluice::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical flow control use cases.
    //!
    //! # Example
    //! ```rust
    //! use sluice::prelude::*;
    //!
    //! let limiter = RateLimiterBuilder::new().policy(Policy::TokenBucket).build().unwrap();
    //! let pool = ConnectionPool::new(PoolConfig::default()).unwrap();
    //! let queue: BlockingQueue<u8> = BlockingQueue::new(8).unwrap();
    //! let status = HealthStatus::Healthy;
    //! ```

    pub use crate::{
        BlockingQueue, CancelToken, ConnectionPool, Error, HealthStatus, KeyedRateLimiter,
        PoolConfig, Policy, RateLimiter, RateLimiterBuilder, RateLimiterConfig,
        RateLimiterMetrics, Result, SharedPool, SharedRateLimiter,
    };
}

/// Builder pattern for creating rate limiters with custom configuration.
///
/// # Example
///
/// ```rust
/// use sluice::{Policy, RateLimiterBuilder};
/// use std::time::Duration;
///
/// // 100 requests per minute, smoothed
/// let limiter = RateLimiterBuilder::new()
///     .policy(Policy::TokenBucket)
///     .max_requests(100)
///     .window(Duration::from_secs(60))
///     .build()
///     .unwrap();
/// assert_eq!(limiter.available_permits(), 100);
///
/// // Invalid settings surface as errors
/// let result = RateLimiterBuilder::new().max_requests(0).build();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RateLimiterBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterBuilder {
    /// Creates a new builder with default configuration.
    ///
    /// Default configuration:
    /// - fixed window policy
    /// - 10 requests
    /// - 1000ms window
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the admission policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Sets N, the admissions allowed per window (must be > 0).
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    /// Sets W, the window length (must be non-zero).
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Builds the limiter.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when N is 0 or W is zero.
    pub fn build(self) -> Result<Box<dyn RateLimiter>> {
        create_rate_limiter(self.config)
    }

    /// Builds the limiter behind an `Arc` for sharing across threads.
    ///
    /// # Errors
    ///
    /// As for [`build`](Self::build).
    pub fn build_shared(self) -> Result<SharedRateLimiter> {
        self.build().map(Arc::from)
    }

    /// Builds a [`KeyedRateLimiter`] whose per-key limiters use this configuration.
    ///
    /// # Errors
    ///
    /// As for [`build`](Self::build).
    pub fn build_keyed<K>(self) -> Result<KeyedRateLimiter<K>>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    {
        KeyedRateLimiter::new(self.config)
    }
}
