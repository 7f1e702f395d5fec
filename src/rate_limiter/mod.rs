//! # Rate Limiter Module
//!
//! Admission control over a window of `W` with at most `N` admissions,
//! under one of three interchangeable policies.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs            (You are here - Module organization)
//!     ├── config.rs         (Policy selection, N and W, validation)
//!     ├── core.rs           (Blocking engine, trait and factory)
//!     ├── fixed_window.rs   (Counter reset at window boundaries)
//!     ├── sliding_window.rs (Log of admission instants)
//!     ├── token_bucket.rs   (Continuously refilled fractional tokens)
//!     ├── manager.rs        (One limiter per key, bounded)
//!     └── metrics.rs        (Counters and health)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     User Request
//!          │
//!          ▼
//!     ┌─────────┐
//!     │ Keyed   │ ◄── Optional per-key fan-out
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Core   │ ◄── Mutex + condvar, deadlines, cancellation
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │ Policy  │ ◄── fixed window | sliding log | token bucket
//!     └─────────┘
//! ```

mod config;
mod core;
mod fixed_window;
mod manager;
mod metrics;
mod sliding_window;
mod token_bucket;

/// Configuration and policy selection
pub use config::{Policy, RateLimiterConfig, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

/// The limiter interface and its factory
pub use self::core::{create_rate_limiter, RateLimiter};

/// Per-key rate limiting with bounded memory
pub use manager::{
    KeyedRateLimiter, ManagerStats, DEFAULT_CLEANUP_INTERVAL, DEFAULT_INACTIVE_AFTER,
    DEFAULT_MAX_KEYS,
};

/// Metrics and health monitoring for observability
pub use metrics::{HealthStatus, RateLimiterMetrics};
