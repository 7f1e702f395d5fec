//! # Core Rate Limiter Engine
//!
//! All three policies share one blocking engine. A policy only decides
//! admission, which waiters a state change may unblock, and how long a
//! refused acquirer should sleep. The engine owns the lock, the condition
//! variable, deadlines, cancellation and metrics.
//!
//! ```text
//!     try_acquire()                     acquire()
//!          │                                │
//!          ▼                                ▼
//!     ┌─────────┐   admitted      ┌──► ┌─────────┐ ── admitted ──► Ok
//!     │  admit  │ ───────────►    │    │  admit  │
//!     └────┬────┘    true         │    └────┬────┘
//!          │ refused              │         │ refused
//!          ▼                      │         ▼
//!        false                    │    cancelled? ── yes ──► Err(Cancelled)
//!                                 │    deadline?  ── yes ──► Err(Timeout)
//!                                 │         │
//!                                 │         ▼
//!                                 └─── park on not_limited for
//!                                      min(wait_hint, deadline)
//! ```
//!
//! Every state change that can unblock waiters signals `not_limited`: a window
//! roll or log eviction broadcasts, a leftover token signals one. Waiters that
//! leave without being admitted signal once more so a wakeup meant for the
//! next waiter is not lost. Critical sections end with a fair unlock, so
//! contended acquirers take the lock in arrival order.

use super::config::{Policy, RateLimiterConfig};
use super::fixed_window::FixedWindow;
use super::metrics::RateLimiterMetrics;
use super::sliding_window::SlidingWindow;
use super::token_bucket::TokenBucket;
use crate::cancel::{any_cancelled, register_all, CancelToken, Registration, Waker};
use crate::error::{Error, Result};
use crate::utils::{deadline_after, instant_after, monotonic_ms};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Common contract of every rate limiting policy.
///
/// Limiters are created through [`create_rate_limiter`] or
/// [`RateLimiterBuilder`](crate::RateLimiterBuilder) and used as trait objects.
///
/// # Example
///
/// ```rust
/// use sluice::{create_rate_limiter, Policy, RateLimiterConfig};
/// use std::time::Duration;
///
/// let config = RateLimiterConfig::new(Policy::FixedWindow, 3, Duration::from_secs(1));
/// let limiter = create_rate_limiter(config).unwrap();
///
/// assert!(limiter.try_acquire());
/// assert!(limiter.try_acquire());
/// assert!(limiter.try_acquire());
/// assert!(!limiter.try_acquire());
///
/// // Blocks until the window rolls
/// limiter.acquire();
/// ```
pub trait RateLimiter: Send + Sync + fmt::Debug {
    /// Admits one request if the policy allows it right now. Never blocks.
    fn try_acquire(&self) -> bool;

    /// Blocks until one request is admitted.
    fn acquire(&self);

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`]; no admission is consumed.
    fn acquire_with(&self, cancel: &CancelToken) -> Result<()>;

    /// Blocks until admitted or until `timeout` of total wall time has passed.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] for a zero timeout.
    /// - [`Error::Timeout`]; no admission is consumed.
    fn acquire_timeout(&self, timeout: Duration) -> Result<()>;

    /// Timed acquire that also honours a cancellation token.
    fn acquire_timeout_with(&self, timeout: Duration, cancel: &CancelToken) -> Result<()>;

    /// The policy this limiter runs.
    fn policy(&self) -> Policy;

    /// The configuration this limiter was built from.
    fn config(&self) -> &RateLimiterConfig;

    /// Admissions `try_acquire` would grant right now (a snapshot).
    fn available_permits(&self) -> u32;

    /// Counters and capacity snapshot.
    fn metrics(&self) -> RateLimiterMetrics;

    /// Time since the last admission attempt.
    fn idle_for(&self) -> Duration;

    /// True when no admission was attempted for longer than `idle`.
    fn is_inactive(&self, idle: Duration) -> bool {
        self.idle_for() > idle
    }

    /// True when the full allowance of N is available again, so a freshly
    /// built limiter would behave exactly like this one.
    fn is_replenished(&self) -> bool {
        self.available_permits() >= self.config().max_requests
    }

    /// Restores full capacity and zeroes the counters. Parked acquirers are woken.
    fn reset(&self);
}

/// Builds the limiter for `config.policy`.
///
/// # Errors
///
/// [`Error::Precondition`] when the configuration does not validate.
pub fn create_rate_limiter(config: RateLimiterConfig) -> Result<Box<dyn RateLimiter>> {
    config.validate()?;
    debug!(
        policy = %config.policy,
        max_requests = config.max_requests,
        window = ?config.window,
        "creating rate limiter"
    );

    Ok(match config.policy {
        Policy::FixedWindow => Box::new(Limiter::<FixedWindow>::new(config)),
        Policy::SlidingWindow => Box::new(Limiter::<SlidingWindow>::new(config)),
        Policy::TokenBucket => Box::new(Limiter::<TokenBucket>::new(config)),
    })
}

/// Which parked acquirers a state change may unblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    None,
    One,
    All,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Decision {
    pub(crate) admitted: bool,
    pub(crate) wake: Wake,
}

impl Decision {
    pub(crate) fn admit(wake: Wake) -> Self {
        Self {
            admitted: true,
            wake,
        }
    }

    pub(crate) fn refuse(wake: Wake) -> Self {
        Self {
            admitted: false,
            wake,
        }
    }
}

/// Time-dependent admission state of one policy. Always accessed under the
/// engine's lock, with `now` taken while holding it.
pub(crate) trait Admission: Send + 'static {
    const POLICY: Policy;

    fn from_config(config: &RateLimiterConfig, now: Instant) -> Self;

    /// Applies any time-dependent update, then admits or refuses one request.
    fn admit(&mut self, now: Instant) -> Decision;

    /// How long a refused acquirer should sleep before checking again.
    /// `None` means check again immediately.
    fn wait_hint(&self, now: Instant) -> Option<Duration>;

    /// Admissions possible at `now`, without mutating state.
    fn remaining(&self, now: Instant) -> u32;

    fn reset(&mut self, now: Instant);
}

struct Shared<A> {
    state: Mutex<A>,
    not_limited: Condvar,
}

/// Counters behind [`RateLimiterMetrics`].
#[derive(Default)]
struct Stats {
    total_acquired: AtomicU64,
    total_rejected: AtomicU64,
    total_waits: AtomicU64,
    total_timeouts: AtomicU64,
    total_cancelled: AtomicU64,
    consecutive_rejections: AtomicU32,
    max_wait_time_ns: AtomicU64,
    last_access_ms: AtomicU64,
}

impl Stats {
    fn on_acquisition(&self) {
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        if self.consecutive_rejections.load(Ordering::Relaxed) > 0 {
            self.consecutive_rejections.store(0, Ordering::Relaxed);
        }
    }

    fn on_rejection(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
        self.consecutive_rejections.fetch_add(1, Ordering::Relaxed);
    }

    fn on_blocking_wait(&self, waited: Duration) {
        let waited_ns = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.max_wait_time_ns.fetch_max(waited_ns, Ordering::Relaxed);
    }

    fn touch(&self) {
        self.last_access_ms.store(monotonic_ms(), Ordering::Relaxed);
    }

    fn pressure_ratio(&self) -> f64 {
        let rejected = self.total_rejected.load(Ordering::Relaxed);
        let total = self.total_acquired.load(Ordering::Relaxed) + rejected;
        if total == 0 {
            0.0
        } else {
            rejected as f64 / total as f64
        }
    }

    fn reset(&self) {
        for counter in [
            &self.total_acquired,
            &self.total_rejected,
            &self.total_waits,
            &self.total_timeouts,
            &self.total_cancelled,
            &self.max_wait_time_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.consecutive_rejections.store(0, Ordering::Relaxed);
    }
}

/// Blocking engine shared by all policies.
pub(crate) struct Limiter<A> {
    shared: Arc<Shared<A>>,
    config: RateLimiterConfig,
    stats: Stats,
}

impl<A: Admission> Limiter<A> {
    /// Expects an already validated configuration.
    pub(crate) fn new(config: RateLimiterConfig) -> Self {
        let state = A::from_config(&config, Instant::now());
        let stats = Stats::default();
        stats.touch();

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                not_limited: Condvar::new(),
            }),
            config,
            stats,
        }
    }

    fn notify(&self, wake: Wake) {
        match wake {
            Wake::None => {}
            Wake::One => {
                self.shared.not_limited.notify_one();
            }
            Wake::All => {
                self.shared.not_limited.notify_all();
            }
        }
    }

    fn acquire_inner(
        &self,
        deadline: Option<(Instant, Duration)>,
        tokens: &[&CancelToken],
    ) -> Result<()> {
        let started = Instant::now();
        // Registered lazily before the first park; dropped after the guard
        let mut registrations: Option<Vec<Registration<'_>>> = None;
        let mut state = self.shared.state.lock();
        self.stats.touch();

        loop {
            let now = Instant::now();
            let decision = state.admit(now);
            self.notify(decision.wake);

            if decision.admitted {
                self.stats.on_acquisition();
                self.stats.on_blocking_wait(started.elapsed());
                MutexGuard::unlock_fair(state);
                return Ok(());
            }

            if any_cancelled(tokens) {
                self.shared.not_limited.notify_one();
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(policy = %A::POLICY, "acquirer cancelled while rate limited");
                return Err(Error::Cancelled);
            }

            if let Some((at, timeout)) = deadline {
                if now >= at {
                    self.shared.not_limited.notify_one();
                    self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                    debug!(policy = %A::POLICY, ?timeout, "acquirer timed out while rate limited");
                    return Err(Error::Timeout { timeout });
                }
            }

            if registrations.is_none() && !tokens.is_empty() {
                registrations = Some(register_all(tokens, &self.waker()));
                continue;
            }

            let Some(wait) = state.wait_hint(now) else {
                continue;
            };
            let mut wake_at = instant_after(now, wait);
            if let Some((at, _)) = deadline {
                wake_at = wake_at.min(at);
            }

            self.stats.total_waits.fetch_add(1, Ordering::Relaxed);
            debug!(policy = %A::POLICY, ?wait, "rate limited, acquirer parked");
            // Only the admission re-check decides; the result is advisory
            let _ = self.shared.not_limited.wait_until(&mut state, wake_at);
        }
    }

    fn acquire_timeout_inner(&self, timeout: Duration, tokens: &[&CancelToken]) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::precondition("acquire timeout must be greater than 0"));
        }
        self.acquire_inner(Some((deadline_after(timeout), timeout)), tokens)
    }

    fn waker(&self) -> Waker {
        let shared = Arc::clone(&self.shared);
        Arc::new(move || {
            let _state = shared.state.lock();
            shared.not_limited.notify_all();
        })
    }
}

impl<A: Admission> RateLimiter for Limiter<A> {
    fn try_acquire(&self) -> bool {
        let mut state = self.shared.state.lock();
        let decision = state.admit(Instant::now());
        self.notify(decision.wake);
        MutexGuard::unlock_fair(state);

        self.stats.touch();
        if decision.admitted {
            self.stats.on_acquisition();
        } else {
            self.stats.on_rejection();
        }
        decision.admitted
    }

    fn acquire(&self) {
        // Without a deadline or token the loop only exits on admission
        let _ = self.acquire_inner(None, &[]);
    }

    fn acquire_with(&self, cancel: &CancelToken) -> Result<()> {
        self.acquire_inner(None, &[cancel])
    }

    fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        self.acquire_timeout_inner(timeout, &[])
    }

    fn acquire_timeout_with(&self, timeout: Duration, cancel: &CancelToken) -> Result<()> {
        self.acquire_timeout_inner(timeout, &[cancel])
    }

    #[inline]
    fn policy(&self) -> Policy {
        A::POLICY
    }

    fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn available_permits(&self) -> u32 {
        self.shared.state.lock().remaining(Instant::now())
    }

    fn metrics(&self) -> RateLimiterMetrics {
        RateLimiterMetrics {
            policy: A::POLICY,
            total_acquired: self.stats.total_acquired.load(Ordering::Relaxed),
            total_rejected: self.stats.total_rejected.load(Ordering::Relaxed),
            total_waits: self.stats.total_waits.load(Ordering::Relaxed),
            total_timeouts: self.stats.total_timeouts.load(Ordering::Relaxed),
            total_cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
            current_permits: u64::from(self.available_permits()),
            max_permits: u64::from(self.config.max_requests),
            consecutive_rejections: self.stats.consecutive_rejections.load(Ordering::Relaxed),
            max_wait_time_ns: self.stats.max_wait_time_ns.load(Ordering::Relaxed),
            pressure_ratio: self.stats.pressure_ratio(),
        }
    }

    fn idle_for(&self) -> Duration {
        let last = self.stats.last_access_ms.load(Ordering::Relaxed);
        Duration::from_millis(monotonic_ms().saturating_sub(last))
    }

    fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.reset(Instant::now());
        self.stats.reset();
        self.shared.not_limited.notify_all();
        MutexGuard::unlock_fair(state);
        debug!(policy = %A::POLICY, "rate limiter reset");
    }
}

impl<A: Admission> fmt::Debug for Limiter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &A::POLICY)
            .field("max_requests", &self.config.max_requests)
            .field("window", &self.config.window)
            .field("available_permits", &self.available_permits())
            .finish()
    }
}
