//! # Connection Pool
//!
//! A fixed roster of reusable handles leased to callers through a
//! [`BlockingQueue`].
//!
//! ```text
//!                     ┌──────────── ConnectionPool ────────────┐
//!     acquire() ◄──── │  available: BlockingQueue<Connection>  │ ◄──── release(conn)
//!                     │  [c1] [c2] [c3]                        │
//!                     └────────────────────────────────────────┘
//!
//!     available.len() + leased == max_connections   (at rest)
//! ```
//!
//! An idle handle can go bad while it sits in the queue. Acquire swaps any
//! invalid handle for a fresh one and tries again, which keeps the roster at
//! full size; the untimed form stops after `max_connections` replacements, the
//! timed form stops at its deadline.
//!
//! Shutdown is sticky. It fails new acquirers fast, wakes acquirers already
//! parked on the queue with [`Error::Shutdown`], and closes every idle handle.
//! Handles still on lease are closed as they come back.

mod config;
mod connection;

pub use config::{PoolConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_TIMEOUT};
pub use connection::{Connection, ConnectionManager, DefaultManager};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::queue::BlockingQueue;
use crate::utils::{deadline_after, remaining};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Fixed-size pool of reusable handles.
///
/// # Example
///
/// ```rust
/// use sluice::{ConnectionPool, PoolConfig};
///
/// let pool = ConnectionPool::new(PoolConfig::new(2)).unwrap();
///
/// let mut conn = pool.acquire().unwrap();
/// assert_eq!(pool.available_count(), 1);
///
/// conn.close(); // went bad while leased
/// pool.release(conn); // replaced with a fresh handle
/// assert_eq!(pool.available_count(), 2);
///
/// pool.shutdown();
/// assert!(pool.acquire().unwrap_err().is_shutdown());
/// ```
pub struct ConnectionPool<M: ConnectionManager = DefaultManager> {
    available: BlockingQueue<M::Connection>,
    manager: M,
    config: PoolConfig,
    leased: AtomicUsize,
    shutdown: AtomicBool,
    /// Fired by `shutdown()` to release acquirers parked on `available`.
    shutdown_signal: CancelToken,
}

impl ConnectionPool<DefaultManager> {
    /// Builds a pool of plain [`Connection`] handles.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when the configuration does not validate.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_manager(config, DefaultManager)
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// Builds a pool whose handles come from `manager`, filled to capacity.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when the configuration does not validate.
    pub fn with_manager(config: PoolConfig, manager: M) -> Result<Self> {
        config.validate()?;
        let available = BlockingQueue::new(config.max_connections)?;

        for _ in 0..config.max_connections {
            if let Err(surplus) = available.try_put(manager.connect()) {
                manager.close(surplus);
            }
        }

        info!(
            max_connections = config.max_connections,
            "connection pool initialized"
        );

        Ok(Self {
            available,
            manager,
            config,
            leased: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            shutdown_signal: CancelToken::new(),
        })
    }

    /// Leases a valid connection, blocking until one is idle.
    ///
    /// # Errors
    ///
    /// - [`Error::Shutdown`] if the pool is or becomes shut down.
    /// - [`Error::Exhausted`] after `max_connections` invalid handles in a row.
    pub fn acquire(&self) -> Result<M::Connection> {
        self.acquire_inner(None, None)
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` fires.
    pub fn acquire_with(&self, cancel: &CancelToken) -> Result<M::Connection> {
        self.acquire_inner(None, Some(cancel))
    }

    /// Leases a valid connection within `timeout` of total wall time.
    ///
    /// # Errors
    ///
    /// - [`Error::Precondition`] for a zero timeout.
    /// - [`Error::Timeout`] once the deadline passes, however many handles were replaced.
    /// - [`Error::Shutdown`] if the pool is or becomes shut down.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<M::Connection> {
        self.acquire_timeout_inner(timeout, None)
    }

    /// Timed acquire that also honours a cancellation token.
    pub fn acquire_timeout_with(
        &self,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<M::Connection> {
        self.acquire_timeout_inner(timeout, Some(cancel))
    }

    /// Leases a connection wrapped in a guard that releases it on drop.
    ///
    /// Waits at most [`PoolConfig::default_timeout`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use sluice::{ConnectionPool, PoolConfig};
    ///
    /// let pool = ConnectionPool::new(PoolConfig::new(1)).unwrap();
    /// {
    ///     let conn = pool.get().unwrap();
    ///     assert!(conn.is_valid());
    ///     assert_eq!(pool.available_count(), 0);
    /// }
    /// assert_eq!(pool.available_count(), 1);
    /// ```
    pub fn get(&self) -> Result<PooledConnection<'_, M>> {
        let conn = self.acquire_timeout(self.config.default_timeout)?;
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    /// Returns a leased connection to the pool.
    ///
    /// An invalid handle is closed and a fresh one takes its slot. After
    /// shutdown the handle is closed instead of re-queued. Never blocks: the
    /// slot this handle came from is still free.
    pub fn release(&self, conn: M::Connection) {
        let _ = self
            .leased
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        if self.is_shutdown() {
            debug!("connection released after shutdown, closing");
            self.manager.close(conn);
            return;
        }

        let conn = if self.manager.is_valid(&conn) {
            conn
        } else {
            debug!("released connection is invalid, replacing");
            self.manager.close(conn);
            self.manager.connect()
        };
        self.restock(conn);
    }

    /// Number of idle connections (a snapshot).
    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    /// Idle, leased and total counts (a snapshot).
    pub fn state(&self) -> PoolState {
        PoolState {
            available: self.available.len(),
            leased: self.leased.load(Ordering::Acquire),
            max_connections: self.config.max_connections,
        }
    }

    /// Configured pool size.
    #[inline]
    pub fn max_connections(&self) -> usize {
        self.config.max_connections
    }

    /// The configuration this pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Shuts the pool down and closes every idle connection. Idempotent.
    ///
    /// Acquirers parked on the pool wake with [`Error::Shutdown`].
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("connection pool already shut down");
            return;
        }

        self.shutdown_signal.cancel();
        let closed = self.close_idle();
        info!(
            closed,
            still_leased = self.leased.load(Ordering::Acquire),
            "connection pool shut down"
        );
    }

    fn acquire_timeout_inner(
        &self,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<M::Connection> {
        if timeout.is_zero() {
            return Err(Error::precondition("acquire timeout must be greater than 0"));
        }
        self.acquire_inner(Some((deadline_after(timeout), timeout)), cancel)
    }

    fn acquire_inner(
        &self,
        deadline: Option<(Instant, Duration)>,
        cancel: Option<&CancelToken>,
    ) -> Result<M::Connection> {
        let mut tokens = vec![&self.shutdown_signal];
        tokens.extend(cancel);

        let budget = self.config.max_connections;
        let mut replaced = 0;

        loop {
            self.ensure_running()?;

            if let Some((at, timeout)) = deadline {
                if remaining(at).is_none() {
                    debug!(?timeout, replaced, "acquire deadline passed");
                    return Err(Error::Timeout { timeout });
                }
            }

            let conn = self
                .available
                .take_inner(deadline, &tokens)
                .map_err(|err| self.shutdown_aware(err))?;

            if self.is_shutdown() {
                self.manager.close(conn);
                return Err(Error::Shutdown);
            }

            if self.manager.is_valid(&conn) {
                self.leased.fetch_add(1, Ordering::AcqRel);
                return Ok(conn);
            }

            warn!(attempt = replaced + 1, "idle connection invalid, enqueueing replacement");
            self.manager.close(conn);
            self.restock(self.manager.connect());
            replaced += 1;

            if deadline.is_none() && replaced >= budget {
                warn!(attempts = replaced, "no valid connection within retry budget");
                return Err(Error::Exhausted { attempts: replaced });
            }
        }
    }

    /// Puts a handle back into its free slot.
    fn restock(&self, conn: M::Connection) {
        if let Err(surplus) = self.available.try_put(conn) {
            warn!("pool already full, closing surplus connection (released twice?)");
            self.manager.close(surplus);
            return;
        }

        // Lost a race with shutdown: nothing may stay idle afterwards
        if self.is_shutdown() {
            self.close_idle();
        }
    }

    fn close_idle(&self) -> usize {
        let drained = self.available.drain();
        let closed = drained.len();
        for conn in drained {
            self.manager.close(conn);
        }
        closed
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    fn shutdown_aware(&self, err: Error) -> Error {
        if err.is_cancelled() && self.is_shutdown() {
            Error::Shutdown
        } else {
            err
        }
    }
}

impl<M: ConnectionManager> fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("state", &self.state())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    /// Idle connections in the queue.
    pub available: usize,
    /// Connections currently held by callers.
    pub leased: usize,
    /// Configured pool size.
    pub max_connections: usize,
}

impl PoolState {
    /// True when no connection is idle.
    pub fn is_exhausted(&self) -> bool {
        self.available == 0
    }
}

/// A leased connection that returns itself to the pool when dropped.
pub struct PooledConnection<'a, M: ConnectionManager = DefaultManager> {
    pool: &'a ConnectionPool<M>,
    conn: Option<M::Connection>,
}

impl<M: ConnectionManager> Deref for PooledConnection<'_, M> {
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        // Only taken in drop
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<'_, M> {
    fn deref_mut(&mut self) -> &mut M::Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<'_, M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl<M> fmt::Debug for PooledConnection<'_, M>
where
    M: ConnectionManager,
    M::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}
