//! # Sliding Window Log Policy
//!
//! ```text
//!                      (now - W, now]
//!                 ┌──────────────────────┐
//!     ──●────●────┼──●──────●────────●───┤──► time
//!       evicted   │  oldest           newest
//!                 └──────────────────────┘
//!                  log: [t3, t4, t5]   admit while |log| < N
//! ```
//!
//! Every admission instant is logged. Entries at least `W` old are evicted on
//! each check, so the count always covers the trailing window and no boundary
//! burst is possible. Memory is `O(N)` per limiter.

use super::config::{Policy, RateLimiterConfig};
use super::core::{Admission, Decision, Wake};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Admission log for the sliding window policy.
#[derive(Debug)]
pub(crate) struct SlidingWindow {
    max_requests: u32,
    window: Duration,
    log: VecDeque<Instant>,
}

impl SlidingWindow {
    fn is_expired(&self, admitted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(admitted_at) >= self.window
    }

    fn live_entries(&self, now: Instant) -> usize {
        self.log
            .iter()
            .skip_while(|&&admitted_at| self.is_expired(admitted_at, now))
            .count()
    }
}

impl Admission for SlidingWindow {
    const POLICY: Policy = Policy::SlidingWindow;

    fn from_config(config: &RateLimiterConfig, _now: Instant) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            // Grows on demand; a huge N should not allocate up front
            log: VecDeque::with_capacity((config.max_requests as usize).min(1024)),
        }
    }

    fn admit(&mut self, now: Instant) -> Decision {
        let mut evicted = 0usize;
        while let Some(&oldest) = self.log.front() {
            if !self.is_expired(oldest, now) {
                break;
            }
            self.log.pop_front();
            evicted += 1;
        }

        let wake = if evicted > 0 {
            debug!(evicted, "sliding window evicted expired admissions");
            Wake::All
        } else {
            Wake::None
        };

        if self.log.len() < self.max_requests as usize {
            self.log.push_back(now);
            Decision::admit(wake)
        } else {
            Decision::refuse(wake)
        }
    }

    fn wait_hint(&self, now: Instant) -> Option<Duration> {
        let oldest = *self.log.front()?;
        let age = now.saturating_duration_since(oldest);
        self.window.checked_sub(age).filter(|wait| !wait.is_zero())
    }

    fn remaining(&self, now: Instant) -> u32 {
        let live = self.live_entries(now) as u32;
        self.max_requests.saturating_sub(live)
    }

    fn reset(&mut self, _now: Instant) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_ms: u64) -> (SlidingWindow, Instant) {
        let start = Instant::now();
        let config = RateLimiterConfig::new(
            Policy::SlidingWindow,
            max_requests,
            Duration::from_millis(window_ms),
        );
        (SlidingWindow::from_config(&config, start), start)
    }

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn test_admits_up_to_limit_then_refuses() {
        let (mut state, start) = limiter(3, 1000);
        let admitted: Vec<bool> = (0..5).map(|_| state.admit(start).admitted).collect();
        assert_eq!(admitted, vec![true, true, true, false, false]);
        assert_eq!(state.log.len(), 3);
    }

    #[test]
    fn test_no_boundary_burst() {
        let (mut state, start) = limiter(3, 1000);

        for _ in 0..3 {
            assert!(state.admit(at(start, 999)).admitted);
        }
        // A fixed window would have rolled here
        assert!(!state.admit(at(start, 1001)).admitted);
        assert!(!state.admit(at(start, 1998)).admitted);

        let freed = state.admit(at(start, 1999));
        assert!(freed.admitted);
        assert_eq!(freed.wake, Wake::All);
    }

    #[test]
    fn test_eviction_is_partial() {
        let (mut state, start) = limiter(3, 100);
        state.admit(at(start, 0));
        state.admit(at(start, 40));
        state.admit(at(start, 80));

        assert_eq!(state.remaining(at(start, 100)), 1);
        assert!(state.admit(at(start, 100)).admitted);
        assert!(!state.admit(at(start, 100)).admitted);
        assert_eq!(state.log.len(), 3);
    }

    #[test]
    fn test_wait_hint_tracks_oldest_entry() {
        let (mut state, start) = limiter(2, 1000);
        assert_eq!(state.wait_hint(start), None);

        state.admit(at(start, 100));
        state.admit(at(start, 300));
        assert_eq!(state.wait_hint(at(start, 500)), Some(Duration::from_millis(600)));
        assert_eq!(state.wait_hint(at(start, 1100)), None);
    }

    #[test]
    fn test_any_trailing_window_holds_at_most_limit() {
        let (mut state, start) = limiter(5, 100);
        let mut admitted = Vec::new();

        for ms in (0..1000).step_by(3) {
            if state.admit(at(start, ms)).admitted {
                admitted.push(ms);
            }
        }

        for &t in &admitted {
            let in_window = admitted.iter().filter(|&&a| a <= t && a + 100 > t).count();
            assert!(in_window <= 5, "{in_window} admissions in (t-W, t] at t={t}");
        }
    }

    #[test]
    fn test_reset_clears_log() {
        let (mut state, start) = limiter(1, 1000);
        state.admit(start);
        assert_eq!(state.remaining(start), 0);

        state.reset(start);
        assert_eq!(state.remaining(start), 1);
        assert!(state.admit(start).admitted);
    }
}
