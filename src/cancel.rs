//! # Cooperative Cancellation
//!
//! Rust threads cannot be interrupted from the outside, so every blocking
//! operation in this crate has a `*_with` variant that takes a [`CancelToken`].
//!
//! ```text
//!     Waiter thread                        Cancelling thread
//!     ─────────────                        ─────────────────
//!     register wake callback
//!     lock component
//!     check token ── not cancelled
//!     park on condvar (unlocks) ◄──┐
//!                                  │       token.cancel()
//!                                  │         ├─ set flag
//!                                  └──────── └─ callback: lock component,
//!     wake, check token ── cancelled            broadcast condvar
//!     re-signal condvar
//!     return Err(Cancelled)
//! ```
//!
//! The callback takes the component lock before broadcasting, so a waiter that
//! saw the flag unset is guaranteed to be parked by the time the broadcast lands.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Callback run by [`CancelToken::cancel`] to wake a parked waiter.
pub(crate) type Waker = Arc<dyn Fn() + Send + Sync>;

/// A shareable, one-way cancellation flag for blocking operations.
///
/// Clones share the same flag. Once cancelled, a token stays cancelled; every
/// operation handed this token fails with [`Error::Cancelled`](crate::Error::Cancelled)
/// instead of blocking.
///
/// # Example
///
/// ```rust
/// use sluice::{BlockingQueue, CancelToken};
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue: Arc<BlockingQueue<u32>> = Arc::new(BlockingQueue::new(1).unwrap());
/// let token = CancelToken::new();
///
/// let consumer = {
///     let queue = queue.clone();
///     let token = token.clone();
///     thread::spawn(move || queue.take_with(&token))
/// };
///
/// token.cancel();
/// assert!(consumer.join().unwrap().unwrap_err().is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    wakers: Mutex<Vec<(u64, Waker)>>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes every waiter currently parked on it.
    ///
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        // Snapshot so callbacks run without the registry lock held
        let wakers: Vec<Waker> = self
            .inner
            .wakers
            .lock()
            .iter()
            .map(|(_, waker)| Arc::clone(waker))
            .collect();

        debug!(waiters = wakers.len(), "cancel token fired");
        for wake in wakers {
            wake();
        }
    }

    /// Returns true once [`cancel`](Self::cancel) has been called on any clone.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers a wake callback for the lifetime of the returned guard.
    pub(crate) fn register(&self, waker: Waker) -> Registration<'_> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.wakers.lock().push((id, waker));
        Registration { token: self, id }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.inner.wakers.lock().len()
    }

    /// Wake callbacks ever registered on this token.
    #[cfg(test)]
    pub(crate) fn registrations_made(&self) -> u64 {
        self.inner.next_id.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes its wake callback from the token when dropped.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let id = self.id;
        self.token.inner.wakers.lock().retain(|(other, _)| *other != id);
    }
}

/// Registers one waker on every token in `tokens`.
pub(crate) fn register_all<'a>(tokens: &[&'a CancelToken], waker: &Waker) -> Vec<Registration<'a>> {
    tokens
        .iter()
        .map(|&token| token.register(Arc::clone(waker)))
        .collect()
}

/// True when any of the tokens has been cancelled.
#[inline]
pub(crate) fn any_cancelled(tokens: &[&CancelToken]) -> bool {
    tokens.iter().any(|token| token.is_cancelled())
}
