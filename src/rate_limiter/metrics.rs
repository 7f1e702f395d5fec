//! # Rate Limiter Metrics
//!
//! Point-in-time snapshots of how a limiter is doing, plus a coarse health
//! verdict for alerting.
//!
//! ```text
//!     Metrics Snapshot:
//!     ┌─────────────────────────────────────┐
//!     │  Success Rate: 85%                  │
//!     │  ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓░░░  (85/100)     │
//!     │                                     │
//!     │  Permits Used: 70%                  │
//!     │  ▓▓▓▓▓▓▓▓▓▓▓▓▓▓░░░░░░  (7/10)       │
//!     │                                     │
//!     │  Health: Healthy                    │
//!     │  Blocked acquires: 12 (2 timed out) │
//!     │  Max Wait: 180ms                    │
//!     └─────────────────────────────────────┘
//! ```

use super::config::Policy;
use std::fmt;

/// Snapshot of a limiter's counters and current capacity.
///
/// ## Key Metrics
///
/// ### Admission
/// - **total_acquired**: admissions from `try_acquire` and blocking acquires
/// - **total_rejected**: `try_acquire` calls that returned false
///
/// ### Blocking
/// - **total_waits**: times a blocking acquirer parked
/// - **total_timeouts** / **total_cancelled**: blocking acquires that gave up
/// - **max_wait_time_ns**: longest time any blocking acquire took to be admitted
///
/// ### Capacity
/// - **current_permits**: admissions possible right now
/// - **max_permits**: N
///
/// ## Example
///
/// ```rust
/// use sluice::RateLimiterBuilder;
///
/// let limiter = RateLimiterBuilder::new().max_requests(2).build().unwrap();
/// limiter.try_acquire();
/// limiter.try_acquire();
/// limiter.try_acquire();
///
/// let metrics = limiter.metrics();
/// assert_eq!(metrics.total_acquired, 2);
/// assert_eq!(metrics.total_rejected, 1);
/// assert!(metrics.is_under_pressure());
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterMetrics {
    /// Policy of the limiter this snapshot came from.
    pub policy: Policy,

    /// Total admissions.
    pub total_acquired: u64,

    /// Total refused `try_acquire` calls.
    pub total_rejected: u64,

    /// Times a blocking acquirer parked on the condition variable.
    pub total_waits: u64,

    /// Blocking acquires that hit their deadline.
    pub total_timeouts: u64,

    /// Blocking acquires abandoned through a cancellation token.
    pub total_cancelled: u64,

    /// Admissions available right now.
    pub current_permits: u64,

    /// Admissions per window (N).
    pub max_permits: u64,

    /// Refusals since the last admission. High values (>10) mean sustained pressure.
    pub consecutive_rejections: u32,

    /// Longest observed blocking acquire, in nanoseconds.
    pub max_wait_time_ns: u64,

    /// Refused share of all `try_acquire` outcomes (0.0 to 1.0).
    pub pressure_ratio: f64,
}

impl RateLimiterMetrics {
    /// Fraction of requests admitted, 1.0 when nothing has been asked yet.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_acquired + self.total_rejected;
        if total == 0 {
            1.0
        } else {
            self.total_acquired as f64 / total as f64
        }
    }

    /// Fraction of requests refused.
    #[inline]
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    /// True when most requests are refused or no permit is available now.
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.success_rate() < 0.5 || self.current_permits == 0
    }

    /// True after a long refusal streak or a high overall refusal ratio.
    #[inline]
    pub fn is_under_sustained_pressure(&self) -> bool {
        self.consecutive_rejections > 10 || self.pressure_ratio > 0.3
    }

    /// Share of the window's permits already used (0.0 = none used).
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.max_permits == 0 {
            0.0
        } else {
            1.0 - (self.current_permits as f64 / self.max_permits as f64)
        }
    }

    /// Remaining permits as a percentage of N.
    #[inline]
    pub fn availability_percentage(&self) -> f64 {
        if self.max_permits == 0 {
            0.0
        } else {
            (self.current_permits as f64 / self.max_permits as f64) * 100.0
        }
    }

    /// Blocking acquires that gave up, by timeout or cancellation.
    #[inline]
    pub fn total_abandoned(&self) -> u64 {
        self.total_timeouts + self.total_cancelled
    }

    /// Longest blocking acquire in milliseconds.
    #[inline]
    pub fn max_wait_time_ms(&self) -> f64 {
        self.max_wait_time_ns as f64 / 1_000_000.0
    }

    /// Admitted plus refused.
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.total_acquired + self.total_rejected
    }

    /// Three-level verdict: sustained pressure is critical, momentary pressure degraded.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sluice::{HealthStatus, RateLimiterBuilder};
    ///
    /// let limiter = RateLimiterBuilder::new().max_requests(100).build().unwrap();
    /// match limiter.metrics().health_status() {
    ///     HealthStatus::Healthy => {}
    ///     status => eprintln!("limiter {status}: {}", status.suggested_action()),
    /// }
    /// ```
    pub fn health_status(&self) -> HealthStatus {
        if self.is_under_sustained_pressure() {
            HealthStatus::Critical
        } else if self.is_under_pressure() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Multi-line report suitable for logs.
    ///
    /// # Example Output
    ///
    /// ```text
    /// RateLimiter Metrics (token_bucket):
    /// ├─ Admission:
    /// │  ├─ Success Rate: 85.50%
    /// │  └─ Rejection Rate: 14.50%
    /// ├─ Capacity:
    /// │  ├─ Available Permits: 3/10
    /// │  └─ Utilization: 70.00%
    /// ├─ Blocking:
    /// │  ├─ Waits: 12
    /// │  ├─ Timed Out: 2
    /// │  ├─ Cancelled: 0
    /// │  └─ Max Wait Time: 180.000ms
    /// └─ Health:
    ///    ├─ Status: Healthy
    ///    └─ Consecutive Rejections: 0
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "RateLimiter Metrics ({}):\n\
             ├─ Admission:\n\
             │  ├─ Success Rate: {:.2}%\n\
             │  └─ Rejection Rate: {:.2}%\n\
             ├─ Capacity:\n\
             │  ├─ Available Permits: {}/{}\n\
             │  └─ Utilization: {:.2}%\n\
             ├─ Blocking:\n\
             │  ├─ Waits: {}\n\
             │  ├─ Timed Out: {}\n\
             │  ├─ Cancelled: {}\n\
             │  └─ Max Wait Time: {:.3}ms\n\
             └─ Health:\n\
                ├─ Status: {:?}\n\
                └─ Consecutive Rejections: {}",
            self.policy,
            self.success_rate() * 100.0,
            self.rejection_rate() * 100.0,
            self.current_permits,
            self.max_permits,
            self.utilization() * 100.0,
            self.total_waits,
            self.total_timeouts,
            self.total_cancelled,
            self.max_wait_time_ms(),
            self.health_status(),
            self.consecutive_rejections,
        )
    }
}

impl fmt::Display for RateLimiterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Health verdict derived from [`RateLimiterMetrics`].
///
/// ```text
///     Healthy ──────► Normal operation, permits available
///        │
///     Degraded ─────► Momentary pressure, monitor closely
///        │
///     Critical ─────► Sustained pressure, scale up or shed load
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Permits available and most requests admitted.
    Healthy,

    /// Success rate below 50% or no permit available right now.
    Degraded,

    /// More than 10 refusals in a row or over 30% refused overall.
    Critical,
}

impl HealthStatus {
    /// True for anything but [`HealthStatus::Healthy`].
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// One-line guidance for operators.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Monitor closely, consider raising the limit",
            Self::Critical => "Immediate action required: raise the limit or shed load",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RateLimiterMetrics {
        RateLimiterMetrics {
            policy: Policy::FixedWindow,
            total_acquired: 80,
            total_rejected: 20,
            total_waits: 0,
            total_timeouts: 0,
            total_cancelled: 0,
            current_permits: 25,
            max_permits: 100,
            consecutive_rejections: 5,
            max_wait_time_ns: 1_500_000,
            pressure_ratio: 0.2,
        }
    }

    #[test]
    fn test_metrics_calculations() {
        let metrics = sample();
        assert_eq!(metrics.success_rate(), 0.8);
        assert_eq!(metrics.utilization(), 0.75);
        assert_eq!(metrics.availability_percentage(), 25.0);
        assert_eq!(metrics.total_requests(), 100);
        assert_eq!(metrics.max_wait_time_ms(), 1.5);
        assert!(!metrics.is_under_pressure());
        assert_eq!(metrics.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_status() {
        let degraded = RateLimiterMetrics {
            current_permits: 0,
            ..sample()
        };
        assert_eq!(degraded.health_status(), HealthStatus::Degraded);

        let critical = RateLimiterMetrics {
            total_acquired: 40,
            total_rejected: 60,
            consecutive_rejections: 15,
            pressure_ratio: 0.6,
            ..sample()
        };
        assert!(critical.is_under_sustained_pressure());
        assert_eq!(critical.health_status(), HealthStatus::Critical);
    }

    #[test]
    fn test_edge_cases() {
        let idle = RateLimiterMetrics {
            total_acquired: 0,
            total_rejected: 0,
            max_permits: 0,
            current_permits: 0,
            ..sample()
        };
        assert_eq!(idle.success_rate(), 1.0);
        assert_eq!(idle.utilization(), 0.0);
        assert_eq!(idle.availability_percentage(), 0.0);
    }

    #[test]
    fn test_abandoned_counts_timeouts_and_cancellations() {
        let metrics = RateLimiterMetrics {
            total_timeouts: 3,
            total_cancelled: 2,
            ..sample()
        };
        assert_eq!(metrics.total_abandoned(), 5);
    }

    #[test]
    fn test_health_status_methods() {
        assert!(!HealthStatus::Healthy.is_unhealthy());
        assert!(HealthStatus::Degraded.is_unhealthy());
        assert!(HealthStatus::Critical.is_unhealthy());
        assert!(HealthStatus::Critical.suggested_action().contains("Immediate"));
        assert_eq!(HealthStatus::Degraded.to_string(), "Degraded");
    }

    #[test]
    fn test_metrics_display() {
        let display = sample().to_string();
        assert!(display.starts_with("RateLimiter Metrics (fixed_window)"));
        assert!(display.contains("Available Permits: 25/100"));
        assert!(display.contains("Blocking"));
        assert!(display.contains("Health"));
    }
}
