//! Error types for db-command.
//!
//! All error types use `thiserror`. `DbError` is what every public
//! operation returns; the variants follow the failure taxonomy of the
//! command engine:
//!
//! - `Configuration`: the command or settings are in a state the call cannot
//!   proceed from (no connection, disposed command, bad arguments).
//! - `Execution`: the driver failed while preparing, executing or reading.
//!   Always carries the command text and a parameter dump.
//! - `Conversion`: a value could not be coerced to a target type.
//! - `Driver`: the driver failed outside of a command (commit, rollback,
//!   opening a settings-level connection).

use crate::models::ValueKind;
use std::error::Error as StdError;
use std::fmt::Write as _;
use thiserror::Error;

/// Maximum depth of nested causes rendered by [`render_error_chain`].
const MAX_RENDERED_CAUSES: usize = 20;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Execution failed: {0}")]
    Execution(#[source] Box<ContextualError>),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Get the diagnostic context for execution errors.
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Execution(err) => Some(err.context()),
            _ => None,
        }
    }

    /// Get the SQL state reported by the database, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Execution(err) => err.native().sql_state(),
            Self::Driver(err) => err.sql_state(),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion(_))
    }
}

impl From<ContextualError> for DbError {
    fn from(err: ContextualError) -> Self {
        Self::Execution(Box::new(err))
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Driver Errors
// =============================================================================

/// An error raised by the database driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Not supported: {message}")]
    Unsupported { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DriverError {
    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DriverError.
impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DriverError::connection(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DriverError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DriverError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => DriverError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => DriverError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => DriverError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DriverError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => {
                DriverError::connection(format!("Protocol error: {}", msg))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                DriverError::database(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DriverError::database(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DriverError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DriverError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                DriverError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => DriverError::internal("Database worker crashed"),
            _ => DriverError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

// =============================================================================
// Contextual Errors
// =============================================================================

/// One parameter as it was bound when the failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSnapshot {
    pub name: String,
    /// `None` when the value was absent or null.
    pub value: Option<String>,
}

/// Structured diagnostic payload of a failed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub command_text: String,
    pub parameters: Vec<ParameterSnapshot>,
}

impl ErrorContext {
    /// Render the payload as the multi-line diagnostic text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("Query:\n");
        out.push_str(&self.command_text);
        out.push_str("\n\nParameters:\n");
        for p in &self.parameters {
            let _ = writeln!(out, "{} = {}", p.name, p.value.as_deref().unwrap_or("(null)"));
        }
        out
    }
}

/// A driver failure enriched with the originating command and parameters.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ContextualError {
    message: String,
    context: String,
    payload: Option<ErrorContext>,
    #[source]
    native: DriverError,
}

impl ContextualError {
    pub fn new(native: DriverError, context: String, payload: Option<ErrorContext>) -> Self {
        Self {
            message: native.to_string(),
            context,
            payload,
            native,
        }
    }

    /// The rendered diagnostic context.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// The structured payload; `None` when building the context failed.
    pub fn payload(&self) -> Option<&ErrorContext> {
        self.payload.as_ref()
    }

    /// The underlying driver error.
    pub fn native(&self) -> &DriverError {
        &self.native
    }

    pub fn into_native(self) -> DriverError {
        self.native
    }
}

// =============================================================================
// Conversion Errors
// =============================================================================

/// A value could not be converted to a target type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {from} value to {target}{}{}", field_suffix(.field), detail_suffix(.detail))]
pub struct ConversionError {
    pub from: ValueKind,
    pub target: &'static str,
    pub field: Option<String>,
    pub detail: Option<String>,
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" for field '{f}'"))
        .unwrap_or_default()
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl ConversionError {
    pub fn new(from: ValueKind, target: &'static str, detail: Option<String>) -> Self {
        Self {
            from,
            target,
            field: None,
            detail,
        }
    }

    /// Attach the name of the field being assigned.
    pub fn for_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Render an error and its chain of causes as diagnostic text.
pub fn render_error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{err}");

    let mut source = err.source();
    let mut depth = 1;
    while let Some(inner) = source {
        if depth > MAX_RENDERED_CAUSES {
            out.push_str("\n[further causes omitted]\n");
            break;
        }
        let _ = write!(out, "\n[Cause #{depth}]\n{inner}\n");
        source = inner.source();
        depth += 1;
    }

    out.push('\n');
    out
}
