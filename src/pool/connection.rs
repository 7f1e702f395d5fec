//! Pooled handles and the trait that creates, validates and closes them.

use std::fmt;
use uuid::Uuid;

/// Creates, validates and closes the handles a pool manages.
///
/// The pool never looks inside a connection; it only asks the manager whether
/// a handle is still usable and hands dead ones back for closing.
pub trait ConnectionManager: Send + Sync + 'static {
    /// The pooled handle type.
    type Connection: Send + 'static;

    /// Creates a fresh handle.
    fn connect(&self) -> Self::Connection;

    /// Reports whether `conn` may be handed to a caller.
    fn is_valid(&self, conn: &Self::Connection) -> bool;

    /// Closes a handle that is leaving the pool for good.
    fn close(&self, conn: Self::Connection);
}

/// An opaque pooled handle: an identifier plus a one-way validity flag.
#[derive(Debug, PartialEq, Eq)]
pub struct Connection {
    id: Uuid,
    valid: bool,
}

impl Connection {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            valid: true,
        }
    }

    /// Unique identifier assigned at creation.
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// False once the handle has been closed; never true again after that.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Marks the handle invalid. The pool replaces it on release.
    pub fn close(&mut self) {
        self.valid = false;
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.id)
    }
}

/// Manager for plain [`Connection`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultManager;

impl ConnectionManager for DefaultManager {
    type Connection = Connection;

    fn connect(&self) -> Connection {
        Connection::new()
    }

    fn is_valid(&self, conn: &Connection) -> bool {
        conn.is_valid()
    }

    fn close(&self, mut conn: Connection) {
        conn.close();
    }
}
