//! Command preparation and execution.
//!
//! A [`Command`] is one stored procedure or SQL statement bound to a
//! connection. It is prepared lazily: a stored procedure's formal parameters
//! are derived from the database the first time the command runs, and again
//! only when the timeout, the connection, the text or the presence of a
//! transaction changes.
//!
//! Input values live in the command's [`ParameterStore`]. Before every
//! execution they are copied into the bound parameter slots; afterwards
//! output and input-output values are copied back into the store and a
//! return value is exposed through [`Command::return_value`].
//!
//! # Example
//!
//! ```ignore
//! let mut cmd = settings.procedure("usp_get_orders");
//! cmd.set_parameter("@customer_id", 42);
//! let orders: Vec<Order> = cmd.get_objects()?;
//! ```

mod context;
mod deriver;
mod format;
mod reader;
mod store;
mod transaction;

pub use context::{ErrorContextBuilder, StatementSnapshot};
pub use deriver::ParameterDeriver;
pub use format::format_positional;
pub use reader::{CommandBehavior, DataReader};
pub use store::ParameterStore;
pub use transaction::{Transaction, create_transaction};

use crate::config::LoggingCallback;
use crate::db::connection::same_parameter;
use crate::db::{
    CommandKind, DriverRequest, DriverResponse, ExecuteMode, IsolationLevel, SharedConnection,
};
use crate::error::{ConversionError, DbError, DbResult};
use crate::mapping::{Entity, Materializer};
use crate::models::{
    DataRow, DataSet, DataTable, Direction, FromValue, NativeType, Parameter, Value,
};
use std::fmt;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// What a command was last prepared against.
#[derive(Debug, Clone, PartialEq)]
struct PreparedStatement {
    text: String,
    kind: CommandKind,
    timeout: Duration,
    connection_id: usize,
    transactional: bool,
}

pub struct Command {
    text: String,
    kind: CommandKind,
    timeout: Duration,
    connection: Option<SharedConnection>,
    /// Supplied by the caller; never closed by the command.
    external_connection: bool,
    transaction: Option<Transaction>,
    prepared: Option<PreparedStatement>,
    parameters: ParameterStore,
    derived: Vec<Parameter>,
    return_value: Option<i32>,
    prepare_time: Option<Duration>,
    execute_time: Option<Duration>,
    logger: Option<LoggingCallback>,
    disposed: bool,
}

impl Command {
    /// Create a command on a connection supplied by the caller.
    pub fn new(text: impl Into<String>, kind: CommandKind, connection: SharedConnection) -> Self {
        Self::build(text.into(), kind, Some(connection), true)
    }

    /// Create a stored-procedure command on a caller-supplied connection.
    pub fn procedure(name: impl Into<String>, connection: SharedConnection) -> Self {
        Self::new(name, CommandKind::StoredProcedure, connection)
    }

    /// Create a text command on a caller-supplied connection.
    pub fn text(sql: impl Into<String>, connection: SharedConnection) -> Self {
        Self::new(sql, CommandKind::Text, connection)
    }

    /// Create a text command with `{n}` items substituted from `args`.
    pub fn text_with_args(
        template: &str,
        args: &[&dyn Display],
        connection: SharedConnection,
    ) -> DbResult<Self> {
        Ok(Self::text(format_positional(template, args)?, connection))
    }

    /// Create a command that owns its connection.
    pub(crate) fn owned(
        text: String,
        kind: CommandKind,
        connection: SharedConnection,
        logger: Option<LoggingCallback>,
    ) -> Self {
        let mut command = Self::build(text, kind, Some(connection), false);
        command.logger = logger;
        command
    }

    fn build(
        text: String,
        kind: CommandKind,
        connection: Option<SharedConnection>,
        external_connection: bool,
    ) -> Self {
        Self {
            text,
            kind,
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            connection,
            external_connection,
            transaction: None,
            prepared: None,
            parameters: ParameterStore::new(),
            derived: Vec::new(),
            return_value: None,
            prepare_time: None,
            execute_time: None,
            logger: None,
            disposed: false,
        }
    }

    /// Attach a callback that receives diagnostic failures.
    pub fn with_logger(mut self, logger: LoggingCallback) -> Self {
        self.logger = Some(logger);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn command_text(&self) -> &str {
        &self.text
    }

    /// Replace the command text. The command is prepared again on next use.
    pub fn set_command_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.prepared = None;
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the execution time limit. `Duration::ZERO` means no limit.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.parameters
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) {
        self.parameters.set(name, value);
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Bind a parameter as `native_type`; its value is coerced before binding.
    pub fn set_parameter_type(&mut self, name: &str, native_type: NativeType) {
        self.parameters.set_type(name, native_type);
    }

    /// Formal parameters of the procedure from the last preparation.
    pub fn derived_parameters(&self) -> &[Parameter] {
        &self.derived
    }

    pub fn return_value(&self) -> Option<i32> {
        self.return_value
    }

    pub fn prepare_time(&self) -> Option<Duration> {
        self.prepare_time
    }

    pub fn execute_time(&self) -> Option<Duration> {
        self.execute_time
    }

    pub fn connection(&self) -> Option<&SharedConnection> {
        self.connection.as_ref()
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // =========================================================================
    // Preparation
    // =========================================================================

    fn ensure_usable(&self) -> DbResult<()> {
        if self.disposed {
            Err(DbError::configuration("The command has been disposed"))
        } else {
            Ok(())
        }
    }

    fn require_connection(&self) -> DbResult<SharedConnection> {
        self.connection
            .clone()
            .ok_or_else(|| DbError::configuration("The connection is not set"))
    }

    /// Prepare the command, optionally binding it to `transaction`.
    ///
    /// Without a transaction argument the current one is kept, unless it
    /// has completed, in which case the command is detached from it.
    pub fn prepare(&mut self, transaction: Option<&Transaction>) -> DbResult<()> {
        self.ensure_usable()?;
        let connection = self.require_connection()?;

        match transaction {
            Some(tx) => {
                if !tx.connection().same_as(&connection) {
                    return Err(DbError::configuration(
                        "The transaction belongs to a different connection",
                    ));
                }
                if !tx.is_active() {
                    return Err(DbError::configuration("The transaction is no longer active"));
                }
                self.transaction = Some(tx.clone());
            }
            None => {
                if self.transaction.as_ref().is_some_and(|tx| !tx.is_active()) {
                    debug!(command = %self.text, "Detaching completed transaction");
                    self.transaction = None;
                }
            }
        }

        if !self.needs_prepare(&connection) {
            return Ok(());
        }

        let start = Instant::now();
        if self.kind == CommandKind::StoredProcedure {
            self.derived = match ParameterDeriver::derive(&self.text, &connection) {
                Ok(derived) => derived,
                Err(native) => {
                    let supplied = self.supplied_parameters();
                    let err = ErrorContextBuilder::build(
                        native,
                        Some(StatementSnapshot {
                            text: &self.text,
                            parameters: &supplied,
                        }),
                        self.logger.as_ref(),
                    );
                    warn!(command = %self.text, error = %err, "Parameter derivation failed");
                    return Err(err.into());
                }
            };
        } else {
            self.derived.clear();
        }

        self.prepared = Some(PreparedStatement {
            text: self.text.clone(),
            kind: self.kind,
            timeout: self.timeout,
            connection_id: connection.id(),
            transactional: self.transaction.is_some(),
        });
        let elapsed = start.elapsed();
        self.prepare_time = Some(elapsed);

        debug!(
            command = %self.text,
            params = self.derived.len(),
            transactional = self.transaction.is_some(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Command prepared"
        );
        Ok(())
    }

    fn needs_prepare(&self, connection: &SharedConnection) -> bool {
        match &self.prepared {
            None => true,
            Some(p) => {
                p.text != self.text
                    || p.kind != self.kind
                    || p.timeout != self.timeout
                    || p.connection_id != connection.id()
                    || p.transactional != self.transaction.is_some()
            }
        }
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// The caller's parameters as stored, before any binding.
    fn supplied_parameters(&self) -> Vec<Parameter> {
        self.parameters
            .entries()
            .map(|(name, value, native_type)| {
                let mut parameter = Parameter::declared(name, Direction::Input, native_type);
                parameter.value = value.cloned();
                parameter
            })
            .collect()
    }

    /// Build the parameter slots handed to the driver.
    fn bind_slots(&self) -> DbResult<Vec<Parameter>> {
        match self.kind {
            CommandKind::StoredProcedure => {
                let mut slots = self.derived.clone();
                for slot in &mut slots {
                    let native_type = self.parameters.native_type(&slot.name);
                    slot.value = match self.parameters.get(&slot.name) {
                        Some(value) if slot.direction.accepts_input() => {
                            Some(coerce_to(value.clone(), native_type, &slot.name)?)
                        }
                        _ => None,
                    };
                    if native_type.is_some() {
                        slot.native_type = native_type;
                    }
                }

                for (name, _, _) in self.parameters.entries() {
                    if !slots.iter().any(|s| same_parameter(&s.name, name)) {
                        warn!(
                            command = %self.text,
                            parameter = %name,
                            "Parameter is not declared by the procedure and is ignored"
                        );
                    }
                }
                Ok(slots)
            }
            CommandKind::Text => self
                .parameters
                .entries()
                .map(|(name, value, native_type)| -> DbResult<Parameter> {
                    let value = value
                        .cloned()
                        .map(|v| coerce_to(v, native_type, name))
                        .transpose()?;
                    Ok(Parameter {
                        name: name.to_string(),
                        direction: Direction::Input,
                        native_type,
                        server_type: None,
                        value,
                    })
                })
                .collect(),
        }
    }

    fn run(&mut self, mode: ExecuteMode) -> DbResult<DriverResponse> {
        self.prepare(None)?;
        let connection = self.require_connection()?;
        let mut slots = self.bind_slots()?;

        let start = Instant::now();
        let result = connection.with(|c| {
            if !c.is_open() {
                c.open()?;
            }
            c.execute(DriverRequest {
                text: &self.text,
                kind: self.kind,
                timeout: self.timeout,
                mode,
                parameters: &mut slots,
            })
        });

        let response = match result {
            Ok(response) => response,
            Err(native) => {
                let err = ErrorContextBuilder::build(
                    native,
                    Some(StatementSnapshot {
                        text: &self.text,
                        parameters: &slots,
                    }),
                    self.logger.as_ref(),
                );
                warn!(command = %self.text, error = %err, "Command failed");
                return Err(err.into());
            }
        };

        let elapsed = start.elapsed();
        self.execute_time = Some(elapsed);
        self.transfer_outputs(slots);

        debug!(
            command = %self.text,
            rows_affected = response.rows_affected,
            results = response.results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Command executed"
        );
        Ok(response)
    }

    /// Copy output values back into the store and capture the return value.
    fn transfer_outputs(&mut self, slots: Vec<Parameter>) {
        self.return_value = None;
        for slot in slots {
            match slot.direction {
                Direction::ReturnValue => {
                    self.return_value = match slot.value {
                        Some(v) if !v.is_null() => match i32::from_value(v) {
                            Ok(rv) => Some(rv),
                            Err(e) => {
                                warn!(command = %self.text, error = %e, "Return value is not an integer");
                                None
                            }
                        },
                        _ => None,
                    };
                }
                Direction::Output | Direction::InputOutput => {
                    if let Some(value) = slot.value {
                        self.parameters.set(&slot.name, value);
                    }
                }
                Direction::Input => {}
            }
        }
    }

    /// Execute and return the number of affected rows.
    pub fn execute(&mut self) -> DbResult<u64> {
        Ok(self.run(ExecuteMode::NonQuery)?.rows_affected)
    }

    /// First column of the first row of the first result, `Null` when absent.
    pub fn execute_scalar(&mut self) -> DbResult<Value> {
        let response = self.run(ExecuteMode::Scalar)?;
        Ok(response
            .results
            .first()
            .and_then(DataTable::scalar)
            .cloned()
            .unwrap_or_default())
    }

    /// Like [`execute_scalar`](Self::execute_scalar), converted to `T`.
    ///
    /// Returns `default` when the result is absent or null.
    pub fn execute_scalar_or<T: FromValue>(&mut self, default: T) -> DbResult<T> {
        let value = self.execute_scalar()?;
        if value.is_null() {
            return Ok(default);
        }
        Ok(T::from_value(value)?)
    }

    /// Execute and return a cursor over the result sets.
    pub fn execute_reader(&mut self, behavior: CommandBehavior) -> DbResult<DataReader> {
        let response = self.run(ExecuteMode::Query)?;
        Ok(DataReader::new(
            response.results,
            behavior,
            self.connection.clone(),
        ))
    }

    /// A reader that closes the connection when it is closed.
    pub fn data_reader(&mut self) -> DbResult<DataReader> {
        self.execute_reader(CommandBehavior::CloseConnection)
    }

    pub fn open_data_set(&mut self, name: Option<&str>) -> DbResult<DataSet> {
        let response = self.run(ExecuteMode::Query)?;
        Ok(DataSet::new(name.map(str::to_string), response.results))
    }

    /// The first result set, or an empty table when there is none.
    pub fn open_table(&mut self, name: Option<&str>) -> DbResult<DataTable> {
        let mut table = self
            .open_data_set(None)?
            .take_first()
            .unwrap_or_else(DataTable::empty);
        if let Some(name) = name {
            table.name = Some(name.to_string());
        }
        Ok(table)
    }

    pub fn get_rows(&mut self) -> DbResult<Vec<DataRow>> {
        Ok(self.open_table(None)?.into_rows())
    }

    pub fn get_row_sets(&mut self) -> DbResult<Vec<Vec<DataRow>>> {
        Ok(self
            .open_data_set(None)?
            .tables
            .into_iter()
            .map(DataTable::into_rows)
            .collect())
    }

    /// Materialize the first result set with the default options.
    pub fn get_objects<T: Entity>(&mut self) -> DbResult<Vec<T>> {
        self.get_objects_with(&Materializer::new())
    }

    pub fn get_objects_with<T: Entity>(&mut self, materializer: &Materializer) -> DbResult<Vec<T>> {
        let table = self.open_table(None)?;
        materializer.materialize(&table)
    }

    /// The first materialized object, if any.
    pub fn get_object<T: Entity>(&mut self) -> DbResult<Option<T>> {
        self.get_object_with(&Materializer::new())
    }

    pub fn get_object_with<T: Entity>(&mut self, materializer: &Materializer) -> DbResult<Option<T>> {
        Ok(self.get_objects_with(materializer)?.into_iter().next())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Open the connection, begin a serializable transaction and prepare
    /// the command inside it.
    pub fn begin_transaction(&mut self) -> DbResult<Transaction> {
        self.ensure_usable()?;
        let connection = self.require_connection()?;
        let transaction = Transaction::begin(&connection, IsolationLevel::Serializable)?;
        self.prepare(Some(&transaction))?;
        Ok(transaction)
    }

    /// Commit the command's transaction. No-op without an active one.
    pub fn commit(&mut self) -> DbResult<()> {
        match self.transaction.as_ref().filter(|tx| tx.is_active()) {
            Some(tx) => tx.commit(),
            None => Ok(()),
        }
    }

    /// Roll back the command's transaction. No-op without an active one.
    pub fn rollback(&mut self) -> DbResult<()> {
        match self.transaction.as_ref().filter(|tx| tx.is_active()) {
            Some(tx) => tx.rollback(),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Move the command onto a caller-supplied connection.
    ///
    /// A connection the command owned is closed if nothing else uses it. A
    /// transaction on the previous connection is dropped.
    pub fn set_connection(&mut self, connection: SharedConnection) -> DbResult<()> {
        self.ensure_usable()?;
        if self
            .connection
            .as_ref()
            .is_some_and(|current| current.same_as(&connection))
        {
            return Ok(());
        }

        if self
            .transaction
            .as_ref()
            .is_some_and(|tx| !tx.connection().same_as(&connection))
        {
            self.transaction = None;
        }
        self.release_connection();
        self.connection = Some(connection);
        self.external_connection = true;
        self.prepared = None;
        Ok(())
    }

    fn release_connection(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.external_connection
            || connection.handle_count() > 1
            || connection.in_transaction()
            || !connection.is_open()
        {
            return;
        }
        match connection.close() {
            Ok(()) => debug!(connection = connection.id(), "Owned connection closed"),
            Err(e) => warn!(error = %e, "Failed to close owned connection"),
        }
    }

    /// Release the prepared statement and, when owned and unshared, the
    /// connection. Further use fails. Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.prepared = None;
        self.transaction = None;
        self.release_connection();
        debug!(command = %self.text, "Command disposed");
    }
}

/// Coerce a parameter value to the value kind of an explicit native type.
fn coerce_to(
    value: Value,
    native_type: Option<NativeType>,
    name: &str,
) -> Result<Value, ConversionError> {
    match native_type {
        Some(t) => value.coerce(t.value_kind()).map_err(|e| e.for_field(name)),
        None => Ok(value),
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("connection", &self.connection)
            .field("external_connection", &self.external_connection)
            .field("transaction", &self.transaction)
            .field("prepared", &self.prepared.is_some())
            .field("parameters", &self.parameters)
            .field("disposed", &self.disposed)
            .finish()
    }
}
