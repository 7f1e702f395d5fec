//! # Bounded Blocking Queue
//!
//! A fixed-capacity FIFO shared by any number of producers and consumers.
//!
//! ```text
//!     producers                                   consumers
//!     ──put──►  ┌───────────────────────────┐  ──take──►
//!               │ head                 tail │
//!               │  [a] [b] [c] [ ] [ ]      │
//!               └───────────────────────────┘
//!                  ▲                     ▲
//!          not_empty (signaled     not_full (signaled
//!           on put)                  on take)
//! ```
//!
//! One mutex guards the items; producers and consumers park on separate
//! condition variables so a put never wakes another producer and a take never
//! wakes another consumer. Every wait sits in a loop that re-checks its
//! predicate, and every waiter that leaves early (timeout or cancellation)
//! signals its condition once more so a wakeup meant for the next waiter is
//! never swallowed. Critical sections that hand work to a parked thread end
//! with a fair unlock, so the lock passes to waiters in arrival order.

use crate::cancel::{any_cancelled, register_all, CancelToken, Registration, Waker};
use crate::error::{Error, Result};
use crate::utils::deadline_after;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct Shared<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// Which side of the queue a wake callback should rouse.
#[derive(Clone, Copy)]
enum Side {
    Producers,
    Consumers,
}

/// A put that did not complete. Carries the item back to the caller.
#[derive(Debug)]
pub struct PutError<T> {
    /// The item that was not enqueued.
    pub item: T,
    /// Why the put gave up: [`Error::Timeout`] or [`Error::Cancelled`].
    pub reason: Error,
}

impl<T> PutError<T> {
    /// Returns the rejected item.
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "put failed: {}", self.reason)
    }
}

impl<T: fmt::Debug> std::error::Error for PutError<T> {}

/// Fixed-capacity multi-producer / multi-consumer FIFO with blocking put and take.
///
/// # Example
///
/// ```rust
/// use sluice::BlockingQueue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(BlockingQueue::new(2).unwrap());
///
/// let producer = {
///     let queue = queue.clone();
///     thread::spawn(move || {
///         for i in 1..=3 {
///             queue.put(i); // blocks on the third item until a slot frees up
///         }
///     })
/// };
///
/// assert_eq!(queue.take(), 1);
/// assert_eq!(queue.take(), 2);
/// assert_eq!(queue.take(), 3);
/// producer.join().unwrap();
/// ```
pub struct BlockingQueue<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
}

impl<T> BlockingQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::precondition("queue capacity must be greater than 0"));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
            capacity,
        })
    }

    /// Maximum number of items. Immutable, so no lock is taken.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently queued (a snapshot).
    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    /// True when no item is queued (a snapshot).
    pub fn is_empty(&self) -> bool {
        self.shared.items.lock().is_empty()
    }

    /// True when a put would block (a snapshot).
    pub fn is_full(&self) -> bool {
        self.shared.items.lock().len() >= self.capacity
    }

    /// Returns a copy of the head without removing it, or `None` when empty.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.shared.items.lock().front().cloned()
    }

    /// Appends `item`, blocking while the queue is full.
    pub fn put(&self, item: T) {
        let mut items = self.shared.items.lock();
        while items.len() >= self.capacity {
            debug!(capacity = self.capacity, "queue full, producer parked");
            self.shared.not_full.wait(&mut items);
        }
        self.push_locked(items, item);
    }

    /// Appends `item` if there is room, otherwise hands it back.
    pub fn try_put(&self, item: T) -> std::result::Result<(), T> {
        let items = self.shared.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        self.push_locked(items, item);
        Ok(())
    }

    /// Removes and returns the head, blocking while the queue is empty.
    pub fn take(&self) -> T {
        let mut items = self.shared.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return self.finish_take(items, item);
            }
            debug!("queue empty, consumer parked");
            self.shared.not_empty.wait(&mut items);
        }
    }

    /// Removes and returns the head if there is one.
    pub fn try_take(&self) -> Option<T> {
        let mut items = self.shared.items.lock();
        let item = items.pop_front()?;
        Some(self.finish_take(items, item))
    }

    /// Removes every queued item in FIFO order and wakes all parked producers.
    pub fn drain(&self) -> Vec<T> {
        let mut items = self.shared.items.lock();
        let drained: Vec<T> = items.drain(..).collect();
        if !drained.is_empty() {
            self.shared.not_full.notify_all();
        }
        drained
    }

    fn push_locked(&self, mut items: MutexGuard<'_, VecDeque<T>>, item: T) {
        let was_empty = items.is_empty();
        items.push_back(item);

        // Empty to non-empty may release several parked consumers
        if was_empty {
            self.shared.not_empty.notify_all();
        } else {
            self.shared.not_empty.notify_one();
        }
        MutexGuard::unlock_fair(items);
    }

    fn finish_take(&self, items: MutexGuard<'_, VecDeque<T>>, item: T) -> T {
        self.shared.not_full.notify_one();
        MutexGuard::unlock_fair(items);
        item
    }
}

impl<T: Send + 'static> BlockingQueue<T> {
    /// Like [`put`](Self::put), but gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] inside [`PutError`]; the item is handed back.
    pub fn put_with(&self, item: T, cancel: &CancelToken) -> std::result::Result<(), PutError<T>> {
        self.put_inner(item, None, &[cancel])
    }

    /// Like [`put`](Self::put), but gives up after `timeout` of total waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] inside [`PutError`] for a zero timeout.
    /// - [`Error::Timeout`] inside [`PutError`]; the item is handed back.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> std::result::Result<(), PutError<T>> {
        if let Err(reason) = check_timeout(timeout) {
            return Err(PutError { item, reason });
        }
        self.put_inner(item, Some((deadline_after(timeout), timeout)), &[])
    }

    /// Like [`take`](Self::take), but gives up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`]; no item is removed.
    pub fn take_with(&self, cancel: &CancelToken) -> Result<T> {
        self.take_inner(None, &[cancel])
    }

    /// Like [`take`](Self::take), but gives up after `timeout` of total waiting.
    ///
    /// The deadline is fixed at entry; spurious wakeups and lost races against
    /// other consumers only shrink the remaining time. Use
    /// [`try_take`](Self::try_take) for a non-blocking attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] for a zero timeout.
    /// - [`Error::Timeout`]; no item is removed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sluice::BlockingQueue;
    /// use std::time::Duration;
    ///
    /// let queue: BlockingQueue<u8> = BlockingQueue::new(4).unwrap();
    /// let err = queue.take_timeout(Duration::from_millis(10)).unwrap_err();
    /// assert!(err.is_timeout());
    /// ```
    pub fn take_timeout(&self, timeout: Duration) -> Result<T> {
        check_timeout(timeout)?;
        self.take_inner(Some((deadline_after(timeout), timeout)), &[])
    }

    /// Timed take that also honours a cancellation token.
    pub fn take_timeout_with(&self, timeout: Duration, cancel: &CancelToken) -> Result<T> {
        check_timeout(timeout)?;
        self.take_inner(Some((deadline_after(timeout), timeout)), &[cancel])
    }

    /// Shared take loop. `deadline` carries the absolute deadline and the
    /// caller's original timeout for error reporting.
    ///
    /// Wake callbacks are registered only once the consumer has to park, so
    /// a take that finds an item never touches the tokens' registries.
    pub(crate) fn take_inner(
        &self,
        deadline: Option<(Instant, Duration)>,
        tokens: &[&CancelToken],
    ) -> Result<T> {
        // Declared before the guard so it is dropped after the lock is released
        let mut registrations: Option<Vec<Registration<'_>>> = None;
        let mut items = self.shared.items.lock();

        loop {
            if let Some(item) = items.pop_front() {
                return Ok(self.finish_take(items, item));
            }

            if any_cancelled(tokens) {
                self.shared.not_empty.notify_one();
                debug!("consumer cancelled while waiting");
                return Err(Error::Cancelled);
            }

            if registrations.is_none() && !tokens.is_empty() {
                // Re-check under the lock: a cancel before this point set the
                // flag, a cancel after it blocks on the lock until we park
                registrations = Some(self.register(tokens, Side::Consumers));
                continue;
            }

            match deadline {
                None => self.shared.not_empty.wait(&mut items),
                Some((at, timeout)) => {
                    if Instant::now() >= at {
                        self.shared.not_empty.notify_one();
                        debug!(?timeout, "consumer timed out");
                        return Err(Error::Timeout { timeout });
                    }
                    // Only the predicate re-check above decides; the result is advisory
                    let _ = self.shared.not_empty.wait_until(&mut items, at);
                }
            }
        }
    }

    fn put_inner(
        &self,
        item: T,
        deadline: Option<(Instant, Duration)>,
        tokens: &[&CancelToken],
    ) -> std::result::Result<(), PutError<T>> {
        let mut registrations: Option<Vec<Registration<'_>>> = None;
        let mut items = self.shared.items.lock();

        loop {
            if items.len() < self.capacity {
                self.push_locked(items, item);
                return Ok(());
            }

            if any_cancelled(tokens) {
                self.shared.not_full.notify_one();
                debug!("producer cancelled while waiting");
                return Err(PutError {
                    item,
                    reason: Error::Cancelled,
                });
            }

            if registrations.is_none() && !tokens.is_empty() {
                registrations = Some(self.register(tokens, Side::Producers));
                continue;
            }

            match deadline {
                None => self.shared.not_full.wait(&mut items),
                Some((at, timeout)) => {
                    if Instant::now() >= at {
                        self.shared.not_full.notify_one();
                        debug!(?timeout, "producer timed out");
                        return Err(PutError {
                            item,
                            reason: Error::Timeout { timeout },
                        });
                    }
                    let _ = self.shared.not_full.wait_until(&mut items, at);
                }
            }
        }
    }

    fn register<'a>(&self, tokens: &[&'a CancelToken], side: Side) -> Vec<Registration<'a>> {
        register_all(tokens, &self.waker(side))
    }

    fn waker(&self, side: Side) -> Waker {
        let shared = Arc::clone(&self.shared);
        Arc::new(move || {
            let _items = shared.items.lock();
            match side {
                Side::Producers => shared.not_full.notify_all(),
                Side::Consumers => shared.not_empty.notify_all(),
            };
        })
    }
}

fn check_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::precondition("timeout must be greater than 0"));
    }
    Ok(())
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
