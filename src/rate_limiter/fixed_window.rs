//! # Fixed Window Policy
//!
//! ```text
//!     window_start            window_start + W
//!          │ ✓  ✓  ✓  ✗  ✗           │ ✓ ...
//!     ─────┴──────────────────────────┴──────────► time
//!          count: 1  2  3  3  3        count reset, waiters broadcast
//! ```
//!
//! Admissions are counted per window. A window rolls lazily: the first check
//! at or after `window_start + W` starts a new one at that instant. Bursts of
//! up to 2N are possible across a boundary.

use super::config::{Policy, RateLimiterConfig};
use super::core::{Admission, Decision, Wake};
use std::time::{Duration, Instant};
use tracing::debug;

/// Counter state for the fixed window policy.
#[derive(Debug)]
pub(crate) struct FixedWindow {
    max_requests: u32,
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl FixedWindow {
    fn window_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }
}

impl Admission for FixedWindow {
    const POLICY: Policy = Policy::FixedWindow;

    fn from_config(config: &RateLimiterConfig, now: Instant) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            window_start: now,
            count: 0,
        }
    }

    fn admit(&mut self, now: Instant) -> Decision {
        let mut wake = Wake::None;

        if self.window_elapsed(now) {
            debug!(previous_count = self.count, "fixed window rolled");
            self.window_start = now;
            self.count = 0;
            wake = Wake::All;
        }

        if self.count < self.max_requests {
            self.count += 1;
            Decision::admit(wake)
        } else {
            Decision::refuse(wake)
        }
    }

    fn wait_hint(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.window_start);
        self.window
            .checked_sub(elapsed)
            .filter(|wait| !wait.is_zero())
    }

    fn remaining(&self, now: Instant) -> u32 {
        if self.window_elapsed(now) {
            self.max_requests
        } else {
            self.max_requests - self.count
        }
    }

    fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.count = 0;
    }
}
