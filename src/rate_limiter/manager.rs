//! # Keyed Rate Limiter
//!
//! One independent limiter per key (client id, IP address, API token...),
//! created on first use and dropped again once the key goes quiet.
//!
//! ```text
//!     Requests by key:
//!     "alice" ──┐
//!     "bob" ────┼──► KeyedRateLimiter ──► one limiter per key
//!     "carol" ──┘          │
//!                          ▼
//!                   ┌──────────────┐
//!                   │  DashMap     │
//!                   │  key → RL    │
//!                   │  key → RL    │
//!                   │  key → RL    │
//!                   └──────────────┘
//! ```
//!
//! The number of tracked keys is bounded. Crossing 90% of the bound triggers
//! an emergency pass that evicts the most idle limiters down to 70%; at the
//! bound, unknown keys are refused. A periodic cleanup (manual, or on a
//! background thread) removes limiters idle for longer than the configured
//! inactivity period.

use super::config::RateLimiterConfig;
use super::core::{create_rate_limiter, RateLimiter};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on tracked keys.
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Default period of the background cleanup thread.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle time after which a key's limiter may be dropped.
pub const DEFAULT_INACTIVE_AFTER: Duration = Duration::from_secs(300);

/// Per-key rate limiting with bounded memory.
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```rust
/// use sluice::{KeyedRateLimiter, RateLimiterConfig};
///
/// let limiter = KeyedRateLimiter::new(RateLimiterConfig::per_second(2)).unwrap();
///
/// assert!(limiter.try_acquire(&"alice"));
/// assert!(limiter.try_acquire(&"alice"));
/// assert!(!limiter.try_acquire(&"alice"));
///
/// // Other keys have their own allowance
/// assert!(limiter.try_acquire(&"bob"));
/// assert_eq!(limiter.active_keys(), 2);
/// ```
#[derive(Clone)]
pub struct KeyedRateLimiter<K>
where
    K: Eq + Hash,
{
    limiters: Arc<DashMap<K, Arc<dyn RateLimiter>, ahash::RandomState>>,
    active_count: Arc<AtomicUsize>,
    config: RateLimiterConfig,
    max_keys: usize,
    cleanup_interval: Duration,
    inactive_after: Duration,
    total_created: Arc<AtomicU64>,
    total_cleaned: Arc<AtomicU64>,
    cleanup_in_progress: Arc<AtomicBool>,
}

impl<K> KeyedRateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
{
    /// Creates a keyed limiter with default bounds and cleanup settings.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when `config` does not validate.
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        config.validate()?;

        // More shards means less contention; capped to bound per-shard overhead
        let num_shards = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .next_power_of_two()
            .clamp(2, 64);

        Ok(Self {
            limiters: Arc::new(DashMap::with_capacity_and_hasher_and_shard_amount(
                256,
                ahash::RandomState::new(),
                num_shards,
            )),
            active_count: Arc::new(AtomicUsize::new(0)),
            config,
            max_keys: DEFAULT_MAX_KEYS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            inactive_after: DEFAULT_INACTIVE_AFTER,
            total_created: Arc::new(AtomicU64::new(0)),
            total_cleaned: Arc::new(AtomicU64::new(0)),
            cleanup_in_progress: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Creates a keyed limiter with custom cleanup timing.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration of every per-key limiter
    /// * `cleanup_interval` - Period of the background cleanup thread
    /// * `inactive_after` - Idle time after which a key's limiter is dropped
    pub fn with_cleanup_settings(
        config: RateLimiterConfig,
        cleanup_interval: Duration,
        inactive_after: Duration,
    ) -> Result<Self> {
        let mut limiter = Self::new(config)?;
        limiter.cleanup_interval = cleanup_interval;
        limiter.inactive_after = inactive_after;
        Ok(limiter)
    }

    /// Sets the bound on tracked keys. Values below 1 are raised to 1.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    /// Emergency cleanup kicks in at 90% of the bound.
    fn cleanup_threshold(&self) -> usize {
        percent_of(self.max_keys, 90).max(1)
    }

    /// Emergency cleanup evicts down to 70% of the bound.
    fn cleanup_target(&self) -> usize {
        percent_of(self.max_keys, 70)
    }

    /// Returns the limiter for `key`, creating it on first use.
    ///
    /// `None` when the key is new and the bound is reached even after an
    /// emergency cleanup.
    pub fn get_limiter(&self, key: &K) -> Option<Arc<dyn RateLimiter>> {
        if let Some(limiter) = self.limiters.get(key) {
            return Some(Arc::clone(limiter.value()));
        }

        let current = self.active_count.load(Ordering::Acquire);
        if current >= self.cleanup_threshold() {
            self.emergency_cleanup();
        }
        if self.active_count.load(Ordering::Acquire) >= self.max_keys {
            warn!(?key, max_keys = self.max_keys, "key capacity reached, refusing new key");
            return None;
        }

        match self.limiters.entry(key.clone()) {
            Entry::Occupied(occupied) => Some(Arc::clone(occupied.get())),
            Entry::Vacant(vacant) => {
                let prev = self.active_count.fetch_add(1, Ordering::AcqRel);
                if prev >= self.max_keys {
                    self.active_count.fetch_sub(1, Ordering::AcqRel);
                    warn!(?key, "key capacity race detected, refusing new key");
                    return None;
                }

                // The config was validated in the constructor
                let limiter: Arc<dyn RateLimiter> = match create_rate_limiter(self.config.clone()) {
                    Ok(limiter) => Arc::from(limiter),
                    Err(err) => {
                        self.active_count.fetch_sub(1, Ordering::AcqRel);
                        warn!(%err, "failed to create limiter for new key");
                        return None;
                    }
                };
                vacant.insert(Arc::clone(&limiter));

                self.total_created.fetch_add(1, Ordering::Relaxed);
                debug!(?key, total = prev + 1, "created limiter for new key");
                Some(limiter)
            }
        }
    }

    /// Non-blocking admission for `key`. False when refused or at capacity.
    #[inline]
    pub fn try_acquire(&self, key: &K) -> bool {
        match self.get_limiter(key) {
            Some(limiter) => limiter.try_acquire(),
            None => false,
        }
    }

    /// Blocking admission for `key`, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::CapacityReached`] when `key` is new and no slot is free.
    /// - [`Error::Timeout`] and [`Error::Precondition`] as for
    ///   [`RateLimiter::acquire_timeout`].
    pub fn acquire_timeout(&self, key: &K, timeout: Duration) -> Result<()> {
        let limiter = self.get_limiter(key).ok_or(Error::CapacityReached {
            limit: self.max_keys,
        })?;
        limiter.acquire_timeout(timeout)
    }

    /// Stops tracking `key`. Returns true if it was tracked.
    pub fn remove(&self, key: &K) -> bool {
        if self.limiters.remove(key).is_some() {
            self.active_count.fetch_sub(1, Ordering::AcqRel);
            self.total_cleaned.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    fn emergency_cleanup(&self) {
        if self
            .cleanup_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let _guard = CleanupGuard {
            flag: &self.cleanup_in_progress,
        };

        let before = self.active_count.load(Ordering::Acquire);
        let target = self.cleanup_target();
        if before <= target {
            return;
        }

        let to_remove = before - target;
        let idle_threshold = self.inactive_after / 2;
        info!(before, to_remove, ?idle_threshold, "starting emergency key cleanup");

        let mut candidates: Vec<(Duration, K)> = self
            .limiters
            .iter()
            .filter(|entry| is_evictable(entry.value().as_ref(), idle_threshold))
            .map(|entry| (entry.value().idle_for(), entry.key().clone()))
            .collect();

        // Most idle first
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        let mut removed = 0u64;
        for (_, key) in candidates.into_iter().take(to_remove) {
            // Re-checked under the shard lock: the key may have been used since
            let evicted = self
                .limiters
                .remove_if(&key, |_, limiter| is_evictable(limiter.as_ref(), idle_threshold));
            if evicted.is_some() {
                self.active_count.fetch_sub(1, Ordering::AcqRel);
                removed += 1;
            }
        }

        if removed > 0 {
            self.total_cleaned.fetch_add(removed, Ordering::Relaxed);
            info!(removed, "emergency cleanup evicted idle limiters");
        }
        if removed < to_remove as u64 {
            warn!(
                removed,
                wanted = to_remove,
                active = self.active_count.load(Ordering::Acquire),
                "emergency cleanup incomplete, too few idle keys"
            );
        }
    }

    /// Drops limiters idle for longer than the inactivity period (half of it
    /// when above the emergency threshold).
    pub fn cleanup(&self) {
        if self.cleanup_in_progress.load(Ordering::Acquire) {
            return;
        }

        let before = self.active_count.load(Ordering::Acquire);
        let threshold = if before > self.cleanup_threshold() {
            self.inactive_after / 2
        } else {
            self.inactive_after
        };

        let mut removed = 0u64;
        self.limiters.retain(|key, limiter| {
            if is_evictable(limiter.as_ref(), threshold) {
                debug!(?key, "removing inactive limiter");
                removed += 1;
                self.active_count.fetch_sub(1, Ordering::AcqRel);
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.total_cleaned.fetch_add(removed, Ordering::Relaxed);
            debug!(removed, "cleanup removed inactive limiters");
        }

        self.shrink_to_fit();
    }

    /// Releases map capacity when it is far larger than the live key count.
    pub fn shrink_to_fit(&self) {
        let current = self.active_count.load(Ordering::Acquire);
        let capacity = self.limiters.capacity();

        if capacity > current * 4 && capacity > 1024 {
            self.limiters.shrink_to_fit();
            debug!(from = capacity, to = current, "shrunk keyed limiter map");
        }
    }

    /// Number of keys currently tracked.
    #[inline]
    pub fn active_keys(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// The configuration every per-key limiter is built from.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Lifetime counters and current occupancy.
    pub fn stats(&self) -> ManagerStats {
        let active_keys = self.active_keys();
        ManagerStats {
            active_keys,
            total_created: self.total_created.load(Ordering::Relaxed),
            total_cleaned: self.total_cleaned.load(Ordering::Relaxed),
            capacity_used: active_keys as f64 / self.max_keys as f64,
            max_capacity: self.max_keys,
        }
    }

    /// Spawns a thread that runs [`cleanup`](Self::cleanup) every cleanup
    /// interval until a message arrives on (or the sender drops) the returned
    /// channel.
    ///
    /// # Errors
    ///
    /// Any error from spawning the thread.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sluice::{KeyedRateLimiter, RateLimiterConfig};
    /// use std::sync::Arc;
    ///
    /// let limiter: Arc<KeyedRateLimiter<u64>> =
    ///     Arc::new(KeyedRateLimiter::new(RateLimiterConfig::per_second(10)).unwrap());
    /// let (handle, stop) = limiter.clone().start_stoppable_cleanup_thread().unwrap();
    ///
    /// stop.send(()).unwrap();
    /// handle.join().unwrap();
    /// ```
    pub fn start_stoppable_cleanup_thread(
        self: Arc<Self>,
    ) -> io::Result<(thread::JoinHandle<()>, mpsc::Sender<()>)> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let manager = self;

        let handle = thread::Builder::new()
            .name("sluice-cleanup".to_string())
            .spawn(move || {
                info!(
                    interval = ?manager.cleanup_interval,
                    inactive_after = ?manager.inactive_after,
                    "started keyed limiter cleanup thread"
                );

                loop {
                    match stop_rx.recv_timeout(manager.cleanup_interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("cleanup thread stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            manager.cleanup();

                            let active = manager.active_keys();
                            if active > manager.cleanup_threshold() {
                                warn!(
                                    active,
                                    percent = active as f64 * 100.0 / manager.max_keys as f64,
                                    "high key usage"
                                );
                            }
                        }
                    }
                }
            })?;

        Ok((handle, stop_tx))
    }

    /// Drops every tracked limiter, including ones still inside their window.
    pub fn clear(&self) {
        // One decrement per entry actually removed keeps the count exact
        // while other threads insert and remove concurrently
        let mut count = 0u64;
        self.limiters.retain(|_, _| {
            self.active_count.fetch_sub(1, Ordering::AcqRel);
            count += 1;
            false
        });
        self.total_cleaned.fetch_add(count, Ordering::Relaxed);
        info!(count, "cleared all keyed limiters");
    }
}

/// Idle and back at full allowance, so a fresh limiter for the key would
/// admit exactly what this one admits.
fn is_evictable(limiter: &dyn RateLimiter, idle: Duration) -> bool {
    limiter.is_inactive(idle) && limiter.is_replenished()
}

fn percent_of(value: usize, percent: u128) -> usize {
    // Widened so bounds near usize::MAX do not overflow
    (value as u128 * percent / 100) as usize
}

impl<K: Eq + Hash> fmt::Debug for KeyedRateLimiter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedRateLimiter")
            .field("policy", &self.config.policy)
            .field("active_keys", &self.active_count.load(Ordering::Acquire))
            .field("max_keys", &self.max_keys)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("inactive_after", &self.inactive_after)
            .finish()
    }
}

/// Resets the emergency cleanup flag on every exit path.
struct CleanupGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Occupancy and lifetime counters of a [`KeyedRateLimiter`].
#[derive(Debug, Clone)]
pub struct ManagerStats {
    /// Keys currently tracked.
    pub active_keys: usize,

    /// Limiters created since construction.
    pub total_created: u64,

    /// Limiters removed by cleanup, eviction, `remove` or `clear`.
    pub total_cleaned: u64,

    /// `active_keys / max_capacity`.
    pub capacity_used: f64,

    /// Bound on tracked keys.
    pub max_capacity: usize,
}

impl ManagerStats {
    /// Multi-line report suitable for logs.
    pub fn summary(&self) -> String {
        format!(
            "Keyed Rate Limiter Stats:\n\
             ├─ Capacity:\n\
             │  ├─ Active Keys: {}/{}\n\
             │  ├─ Capacity Used: {:.2}%\n\
             │  └─ Available Slots: {}\n\
             └─ Lifetime:\n\
                ├─ Total Created: {}\n\
                └─ Total Cleaned: {}",
            self.active_keys,
            self.max_capacity,
            self.capacity_used * 100.0,
            self.max_capacity.saturating_sub(self.active_keys),
            self.total_created,
            self.total_cleaned,
        )
    }

    /// True above 80% of the key bound.
    pub fn is_near_capacity(&self) -> bool {
        self.capacity_used > 0.8
    }

    /// Share of created limiters that were removed again.
    pub fn cleanup_ratio(&self) -> f64 {
        if self.total_created == 0 {
            0.0
        } else {
            self.total_cleaned as f64 / self.total_created as f64
        }
    }
}

impl fmt::Display for ManagerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::config::Policy;
    use std::net::{IpAddr, Ipv4Addr};

    fn config(max_requests: u32) -> RateLimiterConfig {
        RateLimiterConfig::new(Policy::FixedWindow, max_requests, Duration::from_secs(60))
    }

    /// Windows short enough that idle keys are back at full allowance.
    fn short_window(max_requests: u32) -> RateLimiterConfig {
        RateLimiterConfig::new(Policy::FixedWindow, max_requests, Duration::from_millis(20))
    }

    #[test]
    fn test_each_key_has_its_own_allowance() {
        let limiter = KeyedRateLimiter::new(config(5)).unwrap();
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        for _ in 0..5 {
            assert!(limiter.try_acquire(&ip1));
            assert!(limiter.try_acquire(&ip2));
        }
        assert!(!limiter.try_acquire(&ip1));
        assert!(!limiter.try_acquire(&ip2));
        assert_eq!(limiter.active_keys(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(KeyedRateLimiter::<u32>::new(config(0)).is_err());
    }

    #[test]
    fn test_cleanup_removes_inactive_keys() {
        let limiter = KeyedRateLimiter::with_cleanup_settings(
            short_window(10),
            Duration::from_secs(1),
            Duration::from_millis(50),
        )
        .unwrap();

        for i in 0..10u32 {
            limiter.try_acquire(&i);
        }
        assert_eq!(limiter.active_keys(), 10);

        thread::sleep(Duration::from_millis(100));
        limiter.try_acquire(&0);
        limiter.cleanup();

        assert_eq!(limiter.active_keys(), 1);
        assert_eq!(limiter.stats().total_cleaned, 9);
    }

    #[test]
    fn test_stats() {
        let limiter = KeyedRateLimiter::new(config(10)).unwrap();
        for i in 0..5u8 {
            limiter.try_acquire(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, i)));
        }

        let stats = limiter.stats();
        assert_eq!(stats.active_keys, 5);
        assert_eq!(stats.total_created, 5);
        assert_eq!(stats.total_cleaned, 0);
        assert!(stats.capacity_used > 0.0);
        assert!(!stats.is_near_capacity());
        assert_eq!(stats.cleanup_ratio(), 0.0);
        assert!(stats.summary().contains("Active Keys: 5"));
    }

    #[test]
    fn test_clear_and_remove() {
        let limiter = KeyedRateLimiter::new(config(1)).unwrap();
        for i in 0..10u32 {
            limiter.try_acquire(&i);
        }

        assert!(limiter.remove(&3));
        assert!(!limiter.remove(&3));
        assert_eq!(limiter.active_keys(), 9);

        limiter.clear();
        assert_eq!(limiter.active_keys(), 0);
        assert_eq!(limiter.stats().total_cleaned, 10);

        // A removed key starts over with a fresh allowance
        assert!(limiter.try_acquire(&0));
    }

    #[test]
    fn test_capacity_bound_refuses_new_keys() {
        let limiter = KeyedRateLimiter::new(config(10)).unwrap().with_max_keys(4);
        for i in 0..4u32 {
            assert!(limiter.try_acquire(&i));
        }

        // Nothing has been idle for half of the 5 minute default
        assert!(!limiter.try_acquire(&99));
        assert_eq!(
            limiter.acquire_timeout(&99, Duration::from_millis(10)),
            Err(Error::CapacityReached { limit: 4 })
        );
        assert_eq!(limiter.active_keys(), 4);

        // Known keys keep working
        assert!(limiter.try_acquire(&0));
    }

    #[test]
    fn test_emergency_cleanup_evicts_most_idle() {
        let limiter = KeyedRateLimiter::with_cleanup_settings(
            short_window(10),
            Duration::from_secs(60),
            Duration::from_millis(40),
        )
        .unwrap()
        .with_max_keys(10);

        for i in 0..9u32 {
            limiter.try_acquire(&i);
        }
        thread::sleep(Duration::from_millis(40));

        // At 90% of the bound: evict down to 7, then admit the new key
        assert!(limiter.try_acquire(&100));
        assert_eq!(limiter.active_keys(), 8);
        assert_eq!(limiter.stats().total_cleaned, 2);
    }

    #[test]
    fn test_cleanup_keeps_keys_inside_their_window() {
        let limiter = KeyedRateLimiter::with_cleanup_settings(
            RateLimiterConfig::new(Policy::SlidingWindow, 1, Duration::from_secs(3600)),
            Duration::from_secs(60),
            Duration::from_millis(50),
        )
        .unwrap();

        assert!(limiter.try_acquire(&"client"));
        assert!(!limiter.try_acquire(&"client"));

        thread::sleep(Duration::from_millis(80));
        limiter.cleanup();

        // Idle, but its one admission is still in the window
        assert_eq!(limiter.active_keys(), 1);
        assert_eq!(limiter.stats().total_cleaned, 0);
        assert!(!limiter.try_acquire(&"client"));
    }

    #[test]
    fn test_emergency_cleanup_keeps_keys_inside_their_window() {
        let limiter = KeyedRateLimiter::with_cleanup_settings(
            RateLimiterConfig::new(Policy::FixedWindow, 1, Duration::from_secs(3600)),
            Duration::from_secs(60),
            Duration::from_millis(40),
        )
        .unwrap()
        .with_max_keys(10);

        for i in 0..9u32 {
            assert!(limiter.try_acquire(&i));
        }
        thread::sleep(Duration::from_millis(60));

        // Nothing is evictable, the last free slot goes to the new key
        assert!(limiter.try_acquire(&100));
        assert_eq!(limiter.active_keys(), 10);
        assert_eq!(limiter.stats().total_cleaned, 0);

        assert!(!limiter.try_acquire(&0));
        assert!(!limiter.try_acquire(&101));
    }

    #[test]
    fn test_unbounded_key_limit() {
        let limiter = KeyedRateLimiter::new(config(1)).unwrap().with_max_keys(usize::MAX);

        assert!(limiter.try_acquire(&1u32));
        assert!(limiter.cleanup_threshold() > usize::MAX / 10 * 8);
        assert!(limiter.cleanup_target() > usize::MAX / 10 * 6);
        assert!(limiter.cleanup_target() < limiter.cleanup_threshold());
        assert_eq!(limiter.active_keys(), 1);
    }

    #[test]
    fn test_key_count_exact_under_concurrent_clear() {
        let limiter = Arc::new(KeyedRateLimiter::new(config(1_000)).unwrap());

        let workers: Vec<_> = (0..4u32)
            .map(|thread_id| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    for round in 0..200u32 {
                        let key = (thread_id * 1_000) + (round % 16);
                        limiter.try_acquire(&key);
                        if round % 3 == 0 {
                            limiter.remove(&key);
                        }
                    }
                })
            })
            .collect();
        let clearer = {
            let limiter = limiter.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    limiter.clear();
                    thread::yield_now();
                }
            })
        };

        for handle in workers {
            handle.join().unwrap();
        }
        clearer.join().unwrap();

        assert_eq!(limiter.active_keys(), limiter.limiters.len());
        assert!(limiter.active_keys() <= 64);

        limiter.clear();
        assert_eq!(limiter.active_keys(), 0);
        assert!(limiter.try_acquire(&u32::MAX));
        assert_eq!(limiter.active_keys(), 1);
    }

    #[test]
    fn test_concurrent_key_access() {
        let limiter = Arc::new(KeyedRateLimiter::new(config(20)).unwrap());

        let handles: Vec<_> = (0..10u8)
            .map(|thread_id| {
                let limiter = limiter.clone();
                thread::spawn(move || {
                    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, thread_id));
                    (0..50).filter(|_| limiter.try_acquire(&ip)).count()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 20);
        }
        assert_eq!(limiter.active_keys(), 10);
    }

    #[test]
    fn test_shared_key_across_threads() {
        let limiter = Arc::new(KeyedRateLimiter::new(config(30)).unwrap());

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || (0..20).filter(|_| limiter.try_acquire(&"shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 30);
        assert_eq!(limiter.stats().total_created, 1);
    }

    #[test]
    fn test_stoppable_cleanup_thread() {
        let limiter = Arc::new(
            KeyedRateLimiter::with_cleanup_settings(
                short_window(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            )
            .unwrap(),
        );

        for i in 0..5u32 {
            limiter.try_acquire(&i);
        }

        let (handle, stop) = limiter.clone().start_stoppable_cleanup_thread().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(limiter.active_keys(), 0);

        stop.send(()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_debug_impl() {
        let limiter = KeyedRateLimiter::<String>::new(config(1)).unwrap();
        let debug = format!("{limiter:?}");
        assert!(debug.contains("KeyedRateLimiter"));
        assert!(debug.contains("active_keys: 0"));
    }
}
