//! # Token Bucket Policy
//!
//! ```text
//!        refill: r = N / W tokens per second
//!              │
//!              ▼
//!     ┌──────────────────┐
//!     │ ● ● ● ○ ○        │  tokens ∈ [0, N], fractional
//!     └────────┬─────────┘
//!              │ admit takes 1 whole token
//!              ▼
//! ```
//!
//! Tokens refill continuously from the elapsed monotonic time on every check.
//! Sustained rate is `r`; burst capacity is `N`.

use super::config::{Policy, RateLimiterConfig};
use super::core::{Admission, Decision, Wake};
use crate::utils::ceil_millis;
use std::time::{Duration, Instant};

/// Fractional token state for the token bucket policy.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: f64,
    /// Tokens per second.
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refilled(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.rate).min(self.capacity)
    }

    fn refill(&mut self, now: Instant) {
        self.tokens = self.refilled(now);
        // Never move backwards if a caller passes an older instant
        self.last_refill = self.last_refill.max(now);
    }
}

impl Admission for TokenBucket {
    const POLICY: Policy = Policy::TokenBucket;

    fn from_config(config: &RateLimiterConfig, now: Instant) -> Self {
        let capacity = f64::from(config.max_requests);
        Self {
            capacity,
            rate: config.refill_rate_per_second(),
            tokens: capacity,
            last_refill: now,
        }
    }

    fn admit(&mut self, now: Instant) -> Decision {
        self.refill(now);

        let admitted = self.tokens >= 1.0;
        if admitted {
            self.tokens -= 1.0;
        }

        // One whole token left over is enough for exactly one more waiter
        let wake = if self.tokens >= 1.0 { Wake::One } else { Wake::None };
        Decision { admitted, wake }
    }

    fn wait_hint(&self, _now: Instant) -> Option<Duration> {
        ceil_millis((1.0 - self.tokens) / self.rate)
    }

    fn remaining(&self, now: Instant) -> u32 {
        self.refilled(now).floor() as u32
    }

    fn reset(&mut self, now: Instant) {
        self.tokens = self.capacity;
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(max_requests: u32, window_ms: u64) -> (TokenBucket, Instant) {
        let start = Instant::now();
        let config = RateLimiterConfig::new(
            Policy::TokenBucket,
            max_requests,
            Duration::from_millis(window_ms),
        );
        (TokenBucket::from_config(&config, start), start)
    }

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_starts_full_and_drains() {
        let (mut state, start) = bucket(5, 1000);
        assert_eq!(state.remaining(start), 5);

        for _ in 0..5 {
            assert!(state.admit(start).admitted);
        }
        assert!(!state.admit(start).admitted);
        assert_eq!(state.remaining(start), 0);
    }

    #[test]
    fn test_refills_at_configured_rate() {
        // r = 5 tokens per second
        let (mut state, start) = bucket(5, 1000);
        for _ in 0..5 {
            state.admit(start);
        }

        let t400 = at(start, 400);
        assert!(state.admit(t400).admitted);
        assert!(state.admit(t400).admitted);
        assert!(!state.admit(t400).admitted);
        assert!(!state.admit(at(start, 401)).admitted);
        assert!(state.admit(at(start, 650)).admitted);
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let (mut state, start) = bucket(3, 100);
        state.admit(start);

        let later = at(start, 60_000);
        assert_eq!(state.remaining(later), 3);
        let admitted = (0..10).filter(|_| state.admit(later).admitted).count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_wait_hint_rounds_up_to_next_token() {
        // r = 5 per second, so one token takes 200ms
        let (mut state, start) = bucket(5, 1000);
        for _ in 0..5 {
            state.admit(start);
        }
        assert_eq!(state.wait_hint(start), Some(Duration::from_millis(200)));

        // 0.25 tokens after 50ms
        assert!(!state.admit(at(start, 50)).admitted);
        let hint = state.wait_hint(at(start, 50)).unwrap();
        assert!(hint >= Duration::from_millis(149) && hint <= Duration::from_millis(150));

        state.reset(at(start, 60));
        assert_eq!(state.wait_hint(at(start, 60)), None);
    }

    #[test]
    fn test_leftover_token_wakes_one_waiter() {
        let (mut state, start) = bucket(2, 1000);
        assert_eq!(state.admit(start).wake, Wake::One);
        assert_eq!(state.admit(start).wake, Wake::None);
    }

    #[test]
    fn test_admissions_bounded_by_burst_plus_rate() {
        // N = 4, r = 40 per second
        let (mut state, start) = bucket(4, 100);
        let mut admitted = 0u32;

        for ms in 0..=500 {
            if state.admit(at(start, ms)).admitted {
                admitted += 1;
            }
        }
        // N + Δ·r = 4 + 0.5 * 40
        assert!(admitted <= 24, "admitted {admitted}");
        assert!(admitted >= 23, "admitted {admitted}");
    }

    #[test]
    fn test_reset_refills_bucket() {
        let (mut state, start) = bucket(2, 1000);
        state.admit(start);
        state.admit(start);
        state.reset(start);
        assert_eq!(state.remaining(start), 2);
    }
}
