//! # Monotonic Time Helpers
//!
//! All correctness-relevant time in this crate comes from [`Instant`]. Wall
//! clock jumps would corrupt windows and deadlines, so nothing here ever reads
//! `SystemTime`.
//!
//! ```text
//!     entry ──► deadline = now + timeout   (computed once)
//!                  │
//!     each wait ──► remaining = deadline - now
//!                  │
//!                  ├─ None     ──► timed out
//!                  └─ Some(d)  ──► park for at most d
//! ```

use std::sync::OnceLock;
use std::time::{Duration, Instant};

// Process-wide monotonic origin for millisecond stamps.
static MONOTONIC_BASE: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed on the monotonic clock since the first call in this process.
///
/// Cheap to store in an `AtomicU64`; used for idle tracking where full
/// `Instant` precision is not needed.
///
/// # Example
///
/// ```rust
/// use sluice::monotonic_ms;
///
/// let before = monotonic_ms();
/// let after = monotonic_ms();
/// assert!(after >= before);
/// ```
#[inline]
pub fn monotonic_ms() -> u64 {
    let base = MONOTONIC_BASE.get_or_init(Instant::now);
    base.elapsed().as_millis() as u64
}

/// Absolute deadline for a wait that starts now.
///
/// Saturates far in the future instead of overflowing for huge timeouts.
#[inline]
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    instant_after(Instant::now(), timeout)
}

/// `from + offset`, saturating about a year out instead of overflowing.
#[inline]
pub(crate) fn instant_after(from: Instant, offset: Duration) -> Instant {
    from.checked_add(offset)
        .unwrap_or_else(|| from + Duration::from_secs(60 * 60 * 24 * 365))
}

/// Time left until `deadline`, or `None` once it has passed.
#[inline]
pub(crate) fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
}

/// Converts fractional seconds to a duration rounded up to whole milliseconds.
///
/// Non-positive and non-finite inputs yield `None`.
#[inline]
pub(crate) fn ceil_millis(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let millis = (seconds * 1000.0).ceil();
    Some(Duration::from_millis(millis.min(u64::MAX as f64) as u64))
}
