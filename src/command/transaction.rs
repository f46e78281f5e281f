//! Transactions shared by one or more commands.
//!
//! A [`Transaction`] is a cheap handle; clones refer to the same database
//! transaction. When the last handle to a still-active transaction is
//! dropped, the transaction is rolled back.

use crate::command::Command;
use crate::db::{IsolationLevel, SharedConnection};
use crate::error::{DbError, DbResult};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Active,
    Committed,
    RolledBack,
    /// The connection closed or moved on to another transaction.
    Abandoned,
}

struct TransactionInner {
    connection: SharedConnection,
    isolation: IsolationLevel,
    token: u64,
    state: Cell<TransactionState>,
}

impl TransactionInner {
    /// Whether this is still the transaction open on the connection.
    fn is_current(&self) -> bool {
        self.connection.current_transaction() == Some(self.token)
    }
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        if self.state.get() == TransactionState::Active && self.is_current() {
            warn!(
                connection = self.connection.id(),
                "Active transaction dropped, rolling back"
            );
            if let Err(e) = self.connection.with(|c| c.rollback()) {
                warn!(error = %e, "Rollback of dropped transaction failed");
            }
        }
    }
}

/// A database transaction bound to one connection.
#[derive(Clone)]
pub struct Transaction {
    inner: Rc<TransactionInner>,
}

impl Transaction {
    /// Begin a transaction, opening the connection if needed.
    pub(crate) fn begin(
        connection: &SharedConnection,
        isolation: IsolationLevel,
    ) -> DbResult<Self> {
        let token = connection.begin_transaction(isolation)?;
        info!(
            connection = connection.id(),
            isolation = isolation.as_sql(),
            "Transaction started"
        );

        Ok(Self {
            inner: Rc::new(TransactionInner {
                connection: connection.clone(),
                isolation,
                token,
                state: Cell::new(TransactionState::Active),
            }),
        })
    }

    pub fn connection(&self) -> &SharedConnection {
        &self.inner.connection
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation
    }

    /// Whether the transaction can still be committed or rolled back.
    ///
    /// A transaction whose connection was closed underneath it is no longer
    /// active, even after a new transaction begins on that connection.
    pub fn is_active(&self) -> bool {
        self.inner.state.get() == TransactionState::Active && self.inner.is_current()
    }

    /// Whether both handles refer to the same transaction.
    pub fn same_as(&self, other: &Transaction) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn commit(&self) -> DbResult<()> {
        self.ensure_active()?;
        self.inner.connection.with(|c| c.commit())?;
        self.inner.state.set(TransactionState::Committed);
        info!(connection = self.inner.connection.id(), "Transaction committed");
        Ok(())
    }

    pub fn rollback(&self) -> DbResult<()> {
        self.ensure_active()?;
        let result = self.inner.connection.with(|c| c.rollback());
        self.inner.state.set(TransactionState::RolledBack);
        result?;
        info!(connection = self.inner.connection.id(), "Transaction rolled back");
        Ok(())
    }

    fn ensure_active(&self) -> DbResult<()> {
        if self.inner.state.get() == TransactionState::Active && !self.inner.is_current() {
            debug!(connection = self.inner.connection.id(), "Transaction ended with its connection");
            self.inner.state.set(TransactionState::Abandoned);
        }
        match self.inner.state.get() {
            TransactionState::Active => Ok(()),
            TransactionState::Abandoned => Err(DbError::configuration(
                "The transaction ended when its connection was closed",
            )),
            TransactionState::Committed => Err(DbError::configuration(
                "The transaction has already been committed",
            )),
            TransactionState::RolledBack => Err(DbError::configuration(
                "The transaction has already been rolled back",
            )),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.inner.connection.id())
            .field("isolation", &self.inner.isolation)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

/// Run several commands in one transaction.
///
/// The first command begins a serializable transaction on its connection.
/// Every other command is moved onto that connection and prepared against
/// the shared transaction before anything executes. Connections the other
/// commands owned are released. If any command cannot be bound, the
/// transaction is rolled back and the error returned.
pub fn create_transaction(commands: &mut [&mut Command]) -> DbResult<Transaction> {
    let (first, rest) = commands.split_first_mut().ok_or_else(|| {
        DbError::configuration("At least one command is required to create a transaction")
    })?;

    let transaction = first.begin_transaction()?;
    let connection = transaction.connection().clone();

    for command in rest.iter_mut() {
        let bound = command
            .set_connection(connection.clone())
            .and_then(|()| command.prepare(Some(&transaction)));
        if let Err(e) = bound {
            if let Err(rollback_err) = transaction.rollback() {
                warn!(error = %rollback_err, "Rollback after failed transaction setup failed");
            }
            return Err(e);
        }
    }

    debug!(
        commands = commands.len(),
        connection = connection.id(),
        "Commands bound to shared transaction"
    );
    Ok(transaction)
}
