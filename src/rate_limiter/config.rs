//! # Rate Limiter Configuration
//!
//! A limiter is described by three values: which policy to run, how many
//! admissions `N` a window allows, and how long the window `W` is.
//!
//! ```text
//!     RateLimiterConfig
//!     ┌──────────────────────────────────────┐
//!     │ policy:       FixedWindow            │ ← how windows are counted
//!     │ max_requests: 100                    │ ← N per window (burst)
//!     │ window:       1000ms                 │ ← W
//!     │                                      │
//!     │ Result: 100 requests/second          │
//!     └──────────────────────────────────────┘
//! ```
//!
//! ## Policies
//!
//! ```text
//!     FixedWindow ───► count per aligned window, resets at each boundary
//!        │              (up to 2N across a boundary)
//!     SlidingWindow ─► log of admission instants, strict N per any W
//!        │
//!     TokenBucket ───► N tokens, refilled continuously at N/W
//! ```

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of admissions per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

/// Admission policy run by a rate limiter.
///
/// # Example
///
/// ```rust
/// use sluice::Policy;
///
/// let policy: Policy = "token_bucket".parse().unwrap();
/// assert_eq!(policy, Policy::TokenBucket);
/// assert_eq!(policy.to_string(), "token_bucket");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
    /// Counts admissions per aligned window `[kW, (k+1)W)`.
    ///
    /// Cheapest policy. Bursts of up to 2N are possible across a boundary.
    #[default]
    FixedWindow,

    /// Keeps a log of admission instants.
    ///
    /// At most N admissions in any interval `(t-W, t]`; memory grows with N.
    SlidingWindow,

    /// Continuous refill at `N/W`, burst capacity N.
    TokenBucket,
}

impl Policy {
    /// Every policy, in declaration order.
    pub const ALL: [Policy; 3] = [Self::FixedWindow, Self::SlidingWindow, Self::TokenBucket];

    /// Stable snake_case name, also accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedWindow => "fixed_window",
            Self::SlidingWindow => "sliding_window",
            Self::TokenBucket => "token_bucket",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|policy| policy.name() == normalized)
            .ok_or_else(|| Error::precondition(format!("unknown rate limit policy: {s:?}")))
    }
}

/// Configuration for a rate limiter.
///
/// ## Examples
///
/// ```rust
/// use sluice::{Policy, RateLimiterConfig};
/// use std::time::Duration;
///
/// // 50 requests per second, fixed window
/// let config = RateLimiterConfig::per_second(50);
///
/// // 1000 requests per minute, strict sliding window
/// let config = RateLimiterConfig::per_minute(1000).with_policy(Policy::SlidingWindow);
///
/// // Custom: 5 requests per 500ms, token bucket
/// let config = RateLimiterConfig::new(Policy::TokenBucket, 5, Duration::from_millis(500));
/// assert_eq!(config.refill_rate_per_second(), 10.0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Admission policy.
    pub policy: Policy,

    /// Admissions allowed per window (N). Also the token bucket's capacity.
    pub max_requests: u32,

    /// Window length (W). Must be non-zero.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    /// Fixed window, 10 requests per second.
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

impl RateLimiterConfig {
    /// Creates a configuration from its three parts.
    ///
    /// # Arguments
    ///
    /// * `policy` - Admission policy
    /// * `max_requests` - Admissions per window
    /// * `window` - Window length
    pub fn new(policy: Policy, max_requests: u32, window: Duration) -> Self {
        Self {
            policy,
            max_requests,
            window,
        }
    }

    /// `requests_per_second` admissions per one-second window.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self {
            max_requests: requests_per_second,
            window: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// `requests_per_minute` admissions per one-minute window.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            max_requests: requests_per_minute,
            window: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Sets the admission policy.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the admissions allowed per window.
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Sets the window length.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Checks that `max_requests` and `window` are positive.
    ///
    /// Called by every constructor that builds a limiter.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::precondition("max_requests must be greater than 0"));
        }
        if self.window.is_zero() {
            return Err(Error::precondition("window must be greater than 0"));
        }
        Ok(())
    }

    /// Sustained admission rate `N / W` in requests per second.
    ///
    /// This is the token bucket's refill rate `r`. A zero window yields 0.0.
    pub fn refill_rate_per_second(&self) -> f64 {
        let seconds = self.window.as_secs_f64();
        if seconds == 0.0 {
            0.0
        } else {
            f64::from(self.max_requests) / seconds
        }
    }
}
