//! The database driver seam.
//!
//! The command engine never talks to a database directly. Everything it
//! needs from a driver is expressed by the [`Connection`] trait: open and
//! close, transactions, executing a request, deriving a procedure's
//! parameters. [`Connector`] creates unopened connections from a connection
//! string.
//!
//! Connections are shared between commands through [`SharedConnection`], a
//! single-threaded handle. Only one statement may be in flight on a
//! connection at a time; the handle enforces this with a `RefCell` borrow.

use crate::error::{DriverError, DriverResult};
use crate::models::{DataTable, Parameter};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted (dirty reads allowed).
    ReadUncommitted,
    /// Read committed.
    #[default]
    ReadCommitted,
    /// Repeatable read.
    RepeatableRead,
    /// Serializable (highest isolation).
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL clause naming this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// How a command is interpreted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `text` is the name of a stored procedure.
    StoredProcedure,
    /// `text` is a literal SQL statement.
    Text,
}

/// What the caller wants back from an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteMode {
    /// Only the affected row count matters.
    NonQuery,
    /// Only the first column of the first row matters.
    Scalar,
    /// All result sets are materialized.
    Query,
}

/// A single execution request handed to the driver.
///
/// Output, input-output and return-value parameters are written back into
/// `parameters` by the driver.
#[derive(Debug)]
pub struct DriverRequest<'a> {
    pub text: &'a str,
    pub kind: CommandKind,
    /// `Duration::ZERO` means no limit.
    pub timeout: Duration,
    pub mode: ExecuteMode,
    pub parameters: &'a mut [Parameter],
}

/// What the driver produced for a request.
#[derive(Debug, Clone, Default)]
pub struct DriverResponse {
    pub rows_affected: u64,
    pub results: Vec<DataTable>,
}

/// A database connection as seen by the command engine.
pub trait Connection {
    fn is_open(&self) -> bool;

    /// Open the connection. Opening an open connection is a no-op.
    fn open(&mut self) -> DriverResult<()>;

    /// Close the connection. Closing a closed connection is a no-op.
    fn close(&mut self) -> DriverResult<()>;

    /// Whether a transaction is currently active on this connection.
    fn in_transaction(&self) -> bool;

    fn begin_transaction(&mut self, isolation: IsolationLevel) -> DriverResult<()>;

    fn commit(&mut self) -> DriverResult<()>;

    fn rollback(&mut self) -> DriverResult<()>;

    fn execute(&mut self, request: DriverRequest<'_>) -> DriverResult<DriverResponse>;

    /// Read a stored procedure's formal parameters from database metadata,
    /// in declaration order.
    fn derive_parameters(&mut self, procedure: &str) -> DriverResult<Vec<Parameter>>;

    fn server_version(&mut self) -> DriverResult<String>;
}

/// Creates unopened connections from a connection string.
pub trait Connector: Send + Sync {
    fn connect(&self, connection_string: &str) -> DriverResult<Box<dyn Connection>>;
}

struct SharedState {
    connection: RefCell<Box<dyn Connection>>,
    /// Number of transactions begun through this handle.
    transactions_begun: Cell<u64>,
}

/// A connection shared by one or more commands.
///
/// Cloning the handle shares the connection; identity comparison is by
/// pointer. The underlying connection is dropped, and therefore closed,
/// when the last handle goes away.
#[derive(Clone)]
pub struct SharedConnection {
    inner: Rc<SharedState>,
}

impl SharedConnection {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            inner: Rc::new(SharedState {
                connection: RefCell::new(connection),
                transactions_begun: Cell::new(0),
            }),
        }
    }

    /// Whether both handles refer to the same connection.
    pub fn same_as(&self, other: &SharedConnection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A stable identifier of the underlying connection.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Number of live handles to this connection.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// Fails when the connection is already in use further up the stack.
    pub fn with<T>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let mut guard = self.inner.connection.try_borrow_mut().map_err(|_| {
            DriverError::internal("connection is busy with another statement")
        })?;
        f(guard.as_mut())
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .connection
            .try_borrow()
            .map(|c| c.is_open())
            .unwrap_or(true)
    }

    pub fn in_transaction(&self) -> bool {
        self.inner
            .connection
            .try_borrow()
            .map(|c| c.in_transaction())
            .unwrap_or(false)
    }

    /// Begin a transaction, opening the connection if needed.
    ///
    /// Returns a token identifying this transaction; see
    /// [`current_transaction`](Self::current_transaction).
    pub fn begin_transaction(&self, isolation: IsolationLevel) -> DriverResult<u64> {
        self.with(|c| {
            if !c.is_open() {
                c.open()?;
            }
            c.begin_transaction(isolation)
        })?;
        let token = self.inner.transactions_begun.get() + 1;
        self.inner.transactions_begun.set(token);
        Ok(token)
    }

    /// Token of the transaction open on the connection, if any.
    ///
    /// A transaction that ended because the connection was closed keeps
    /// its token, but it no longer matches once another one begins.
    pub fn current_transaction(&self) -> Option<u64> {
        self.in_transaction()
            .then(|| self.inner.transactions_begun.get())
    }

    pub fn open(&self) -> DriverResult<()> {
        self.with(|c| c.open())
    }

    pub fn close(&self) -> DriverResult<()> {
        self.with(|c| c.close())
    }
}

impl fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnection")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("handles", &self.handle_count())
            .field("open", &self.is_open())
            .finish()
    }
}

impl From<Box<dyn Connection>> for SharedConnection {
    fn from(connection: Box<dyn Connection>) -> Self {
        Self::new(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockConnection;

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_shared_connection_identity() {
        let a = SharedConnection::new(Box::new(MockConnection::new()));
        let b = a.clone();
        let c = SharedConnection::new(Box::new(MockConnection::new()));
        assert!(a.same_as(&b));
        assert_eq!(a.id(), b.id());
        assert!(!a.same_as(&c));
        assert_eq!(a.handle_count(), 2);
    }

    #[test]
    fn test_shared_connection_open_close() {
        let conn = SharedConnection::new(Box::new(MockConnection::new()));
        assert!(!conn.is_open());
        conn.open().unwrap();
        assert!(conn.is_open());
        conn.close().unwrap();
        assert!(!conn.is_open());
    }

    #[test]
    fn test_transaction_tokens_advance() {
        let conn = SharedConnection::new(Box::new(MockConnection::new()));
        assert_eq!(conn.current_transaction(), None);
        let first = conn.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(conn.current_transaction(), Some(first));
        conn.close().unwrap();
        assert_eq!(conn.current_transaction(), None);
        let second = conn.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
        assert_ne!(first, second);
        assert_eq!(conn.current_transaction(), Some(second));
    }

    #[test]
    fn test_nested_use_is_rejected() {
        let conn = SharedConnection::new(Box::new(MockConnection::new()));
        let inner = conn.clone();
        let result = conn.with(|_| inner.open());
        assert!(matches!(result, Err(DriverError::Internal { .. })));
    }
}
