//! Error types shared by the queue, the pool and the rate limiters.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by blocking and configuration operations.
///
/// Every variant leaves the component usable: a failed call consumed no
/// element, no connection and no admission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An argument or configuration value was out of range.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// A timed operation did not complete before its deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The total wait the caller asked for.
        timeout: Duration,
    },

    /// A blocking operation was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("operation cancelled")]
    Cancelled,

    /// The connection pool has been shut down.
    #[error("connection pool is shut down")]
    Shutdown,

    /// An untimed acquire found only invalid connections within its retry budget.
    #[error("no valid connection after {attempts} attempts")]
    Exhausted {
        /// Number of invalid handles replaced before giving up.
        attempts: usize,
    },

    /// A keyed rate limiter already tracks as many keys as it may.
    #[error("key capacity of {limit} reached")]
    CapacityReached {
        /// Maximum number of tracked keys.
        limit: usize,
    },
}

impl Error {
    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition(reason.into())
    }

    /// Returns true for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true for [`Error::Shutdown`].
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::Timeout {
            timeout: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "timed out after 50ms");
        assert!(err.is_timeout());

        let err = Error::Exhausted { attempts: 3 };
        assert_eq!(err.to_string(), "no valid connection after 3 attempts");

        let err = Error::precondition("capacity must be greater than 0");
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn test_predicates() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::Shutdown.is_shutdown());
        assert!(!Error::Shutdown.is_timeout());
    }
}
