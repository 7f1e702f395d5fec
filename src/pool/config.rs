//! Pool sizing and timeout settings.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default timeout used by [`ConnectionPool::get`](crate::ConnectionPool::get).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Configuration for a [`ConnectionPool`](crate::ConnectionPool).
///
/// # Example
///
/// ```rust
/// use sluice::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new(3).with_default_timeout(Duration::from_secs(2));
/// assert!(config.validate().is_ok());
/// assert!(PoolConfig::new(0).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Fixed number of connections the pool owns. Must be > 0.
    pub max_connections: usize,

    /// Wait bound for [`ConnectionPool::get`](crate::ConnectionPool::get). Must be > 0.
    ///
    /// [`ConnectionPool::acquire`](crate::ConnectionPool::acquire) stays untimed
    /// and is bounded by its retry budget instead.
    pub default_timeout: Duration,
}

impl Default for PoolConfig {
    /// 10 connections, 5 second default timeout.
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Configuration for `max_connections` handles with the default timeout.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Sets the number of pooled connections.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Sets the timeout used by [`ConnectionPool::get`](crate::ConnectionPool::get).
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Checks that both settings are positive.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::precondition("pool size must be greater than 0"));
        }
        if self.default_timeout.is_zero() {
            return Err(Error::precondition("pool default timeout must be greater than 0"));
        }
        Ok(())
    }
}
