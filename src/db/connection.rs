//! Synchronous sqlx driver.
//!
//! `DbConnection` owns one sqlx connection (PostgreSQL, MySQL or SQLite)
//! and a private current-thread tokio runtime that every call is driven
//! on. Calling it from inside another tokio runtime is rejected instead of
//! panicking.
//!
//! # Architecture
//!
//! The connection uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific statements and procedure calls
//! - `postgres`: PostgreSQL-specific statements and procedure calls
//! - `sqlite`: SQLite-specific statements
//!
//! Each submodule provides the same functions adapted to its database.

use crate::db::DatabaseType;
use crate::db::driver::{
    CommandKind, Connection, Connector, DriverRequest, DriverResponse, ExecuteMode,
    IsolationLevel,
};
use crate::db::params::{
    bare_name, bind_mysql_value, bind_postgres_value, bind_sqlite_value,
    rewrite_named_placeholders, text_bindings,
};
use crate::db::types::rows_to_table;
use crate::error::{DriverError, DriverResult};
use crate::models::{DataTable, Direction, NativeType, Parameter, Value, names_equal};
use sqlx::Connection as _;
use sqlx::{MySqlConnection, PgConnection, SqliteConnection};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::time::timeout;
use tracing::{debug, info};

/// Upper bound for establishing a connection.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Name given to a function's return-value parameter.
pub const RETURN_VALUE_NAME: &str = "RETURN_VALUE";

/// Prefix of the MySQL session variables that carry output values.
const MYSQL_OUT_PREFIX: &str = "__out_";

/// An open sqlx connection to one of the supported backends.
pub enum Backend {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

/// A synchronous connection over sqlx.
pub struct DbConnection {
    connection_string: String,
    db_type: DatabaseType,
    runtime: Runtime,
    backend: Option<Backend>,
    in_transaction: bool,
}

impl DbConnection {
    /// Create an unopened connection.
    pub fn new(connection_string: impl Into<String>) -> DriverResult<Self> {
        let connection_string = connection_string.into();
        let db_type = DatabaseType::from_connection_string(&connection_string).ok_or_else(|| {
            DriverError::connection(
                "Invalid connection string: must start with postgres://, mysql://, or sqlite:",
            )
        })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DriverError::internal(format!("failed to start driver runtime: {e}")))?;

        Ok(Self {
            connection_string,
            db_type,
            runtime,
            backend: None,
            in_transaction: false,
        })
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    fn backend_mut(&mut self) -> DriverResult<(&Runtime, &mut Backend)> {
        match self.backend.as_mut() {
            Some(backend) => Ok((&self.runtime, backend)),
            None => Err(DriverError::connection("The connection is not open")),
        }
    }

    fn run_raw(&mut self, statements: &[String]) -> DriverResult<()> {
        let (runtime, backend) = self.backend_mut()?;
        block_on(runtime, async {
            for sql in statements {
                debug!(sql = %sql, "Executing control statement");
                raw_execute(backend, sql).await?;
            }
            Ok(())
        })?
    }
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("db_type", &self.db_type)
            .field("open", &self.backend.is_some())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

/// Drive a future to completion on the connection's runtime.
fn block_on<F: Future>(runtime: &Runtime, future: F) -> DriverResult<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(DriverError::unsupported(
            "synchronous database calls cannot be made from within an async runtime",
        ));
    }
    Ok(runtime.block_on(future))
}

/// Apply a time limit to a driver future. A zero limit means none.
async fn limited<T, F>(limit: Duration, operation: &str, future: F) -> DriverResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    if limit.is_zero() {
        return future.await.map_err(DriverError::from);
    }
    match timeout(limit, future).await {
        Ok(result) => result.map_err(DriverError::from),
        Err(_) => Err(DriverError::timeout(operation, limit.as_secs())),
    }
}

async fn raw_execute(backend: &mut Backend, sql: &str) -> DriverResult<u64> {
    let result = impl_db_dispatch!(backend, {
        MySql(c) => sqlx::Executor::execute(&mut *c, sql).await.map(|r| r.rows_affected()),
        Postgres(c) => sqlx::Executor::execute(&mut *c, sql).await.map(|r| r.rows_affected()),
        SQLite(c) => sqlx::Executor::execute(&mut *c, sql).await.map(|r| r.rows_affected()),
    });
    result.map_err(DriverError::from)
}

impl Connection for DbConnection {
    fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    fn open(&mut self) -> DriverResult<()> {
        if self.backend.is_some() {
            return Ok(());
        }
        let url = self.connection_string.clone();
        let db_type = self.db_type;
        let limit = Duration::from_secs(CONNECT_TIMEOUT_SECS);

        let backend = block_on(&self.runtime, async move {
            limited(limit, "connection open", async {
                Ok::<_, sqlx::Error>(match db_type {
                    DatabaseType::MySql => Backend::MySql(MySqlConnection::connect(&url).await?),
                    DatabaseType::Postgres => {
                        Backend::Postgres(PgConnection::connect(&url).await?)
                    }
                    DatabaseType::SQLite => {
                        Backend::SQLite(SqliteConnection::connect(&url).await?)
                    }
                })
            })
            .await
        })??;

        info!(db_type = %self.db_type, "Connection opened");
        self.backend = Some(backend);
        self.in_transaction = false;
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        self.in_transaction = false;
        let result = block_on(&self.runtime, async move {
            impl_db_dispatch!(backend, {
                MySql(c) => c.close().await,
                Postgres(c) => c.close().await,
                SQLite(c) => c.close().await,
            })
        })?;
        info!(db_type = %self.db_type, "Connection closed");
        result.map_err(DriverError::from)
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn begin_transaction(&mut self, isolation: IsolationLevel) -> DriverResult<()> {
        if self.in_transaction {
            return Err(DriverError::unsupported("nested transactions are not supported"));
        }
        let statements = match self.db_type {
            DatabaseType::Postgres => vec![format!("BEGIN ISOLATION LEVEL {}", isolation.as_sql())],
            DatabaseType::MySql => vec![
                format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql()),
                "START TRANSACTION".to_string(),
            ],
            // SQLite transactions are always serializable.
            DatabaseType::SQLite => vec!["BEGIN IMMEDIATE".to_string()],
        };
        self.run_raw(&statements)?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        if !self.in_transaction {
            return Err(DriverError::database("No transaction is active", None));
        }
        self.run_raw(&["COMMIT".to_string()])?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        if !self.in_transaction {
            return Err(DriverError::database("No transaction is active", None));
        }
        // The transaction is gone on the server whether or not ROLLBACK reports success.
        self.in_transaction = false;
        self.run_raw(&["ROLLBACK".to_string()])
    }

    fn execute(&mut self, request: DriverRequest<'_>) -> DriverResult<DriverResponse> {
        let start = Instant::now();
        let db_type = self.db_type;
        let (runtime, backend) = self.backend_mut()?;
        let DriverRequest {
            text,
            kind,
            timeout: limit,
            mode,
            parameters,
        } = request;

        debug!(
            command = %text,
            params = parameters.len(),
            timeout_secs = limit.as_secs(),
            "Executing command"
        );

        let response = match kind {
            CommandKind::Text => {
                let rewritten = rewrite_named_placeholders(text, db_type);
                let values = text_bindings(&rewritten, parameters)?;
                block_on(runtime, async {
                    let sql = rewritten.sql.as_str();
                    if mode == ExecuteMode::NonQuery {
                        let rows_affected = limited(limit, "command execution", async {
                            impl_db_dispatch!(backend, {
                                MySql(c) => mysql::execute(c, sql, values).await,
                                Postgres(c) => postgres::execute(c, sql, values).await,
                                SQLite(c) => sqlite::execute(c, sql, values).await,
                            })
                        })
                        .await?;
                        Ok(DriverResponse {
                            rows_affected,
                            results: Vec::new(),
                        })
                    } else {
                        let table = limited(limit, "command execution", async {
                            impl_db_dispatch!(backend, {
                                MySql(c) => mysql::fetch_table(c, sql, values).await,
                                Postgres(c) => postgres::fetch_table(c, sql, values).await,
                                SQLite(c) => sqlite::fetch_table(c, sql, values).await,
                            })
                        })
                        .await?;
                        Ok::<_, DriverError>(DriverResponse {
                            rows_affected: 0,
                            results: vec![table],
                        })
                    }
                })??
            }
            CommandKind::StoredProcedure => block_on(runtime, async {
                limited_procedure(backend, text, parameters, limit).await
            })??,
        };

        debug!(
            command = %text,
            elapsed_ms = start.elapsed().as_millis() as u64,
            rows_affected = response.rows_affected,
            results = response.results.len(),
            "Command executed"
        );
        Ok(response)
    }

    fn derive_parameters(&mut self, procedure: &str) -> DriverResult<Vec<Parameter>> {
        let (runtime, backend) = self.backend_mut()?;
        let (schema, name) = split_procedure_name(procedure);

        let (found, metadata) = block_on(runtime, async {
            let result = impl_db_dispatch!(backend, {
                MySql(c) => mysql::parameter_metadata(c, schema, name).await,
                Postgres(c) => postgres::parameter_metadata(c, schema, name).await,
                SQLite(_c) => return Err(DriverError::unsupported(
                    "SQLite does not support stored procedures",
                )),
            });
            result.map_err(DriverError::from)
        })??;

        if !found {
            return Err(DriverError::database(
                format!("Could not find stored procedure '{procedure}'."),
                None,
            ));
        }
        Ok(parameters_from_metadata(&metadata))
    }

    fn server_version(&mut self) -> DriverResult<String> {
        let (runtime, backend) = self.backend_mut()?;
        let table = block_on(runtime, async {
            let result = impl_db_dispatch!(backend, {
                MySql(c) => mysql::fetch_table(c, "SELECT VERSION()", Vec::new()).await,
                Postgres(c) => postgres::fetch_table(c, "SHOW server_version", Vec::new()).await,
                SQLite(c) => sqlite::fetch_table(c, "SELECT sqlite_version()", Vec::new()).await,
            });
            result.map_err(DriverError::from)
        })??;
        Ok(table.scalar().map(Value::to_string).unwrap_or_default())
    }
}

async fn limited_procedure(
    backend: &mut Backend,
    procedure: &str,
    parameters: &mut [Parameter],
    limit: Duration,
) -> DriverResult<DriverResponse> {
    let results = match backend {
        Backend::Postgres(c) => {
            let call = postgres_call(procedure, parameters);
            let table = limited(
                limit,
                "procedure call",
                postgres::fetch_table(c, &call.sql, call.values.clone()),
            )
            .await?;
            if call.has_outputs {
                apply_output_row(&table, parameters);
                Vec::new()
            } else {
                vec![table]
            }
        }
        Backend::MySql(c) => {
            let MySqlCall {
                setup,
                sql,
                values,
                outputs_sql,
                is_function,
            } = mysql_call(procedure, parameters);
            let (table, outputs) = limited(limit, "procedure call", async {
                for (statement, value) in setup {
                    mysql::execute(c, &statement, vec![value]).await?;
                }
                let table = mysql::fetch_table(c, &sql, values).await?;
                let outputs = match &outputs_sql {
                    Some(sql) => Some(mysql::fetch_table(c, sql, Vec::new()).await?),
                    None => None,
                };
                Ok::<_, sqlx::Error>((table, outputs))
            })
            .await?;

            if is_function {
                if let Some(slot) = parameters
                    .iter_mut()
                    .find(|p| p.direction == Direction::ReturnValue)
                {
                    slot.value = Some(table.scalar().cloned().unwrap_or_default());
                }
            }
            if let Some(outputs) = outputs {
                apply_output_row(&outputs, parameters);
            }
            if is_function || table.columns().is_empty() {
                Vec::new()
            } else {
                vec![table]
            }
        }
        Backend::SQLite(_) => {
            return Err(DriverError::unsupported(
                "SQLite does not support stored procedures",
            ));
        }
    };

    Ok(DriverResponse {
        rows_affected: 0,
        results,
    })
}

// =============================================================================
// Procedure Call Building
// =============================================================================

/// A procedure invocation as one statement plus its bound values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PostgresCall {
    pub sql: String,
    pub values: Vec<Value>,
    pub has_outputs: bool,
}

/// Build a `CALL` in named notation.
///
/// Inputs without a value are left out so the procedure default applies.
/// Output arguments are passed as NULL and come back in the returned row.
/// Every argument is cast to the server type recorded at derivation, since
/// procedure resolution does not apply implicit casts such as int8 to int4.
pub(crate) fn postgres_call(procedure: &str, parameters: &[Parameter]) -> PostgresCall {
    let mut args = Vec::new();
    let mut values = Vec::new();
    let mut has_outputs = false;

    let argument = |p: &Parameter, expr: String| match &p.server_type {
        Some(ty) => format!("{} => {expr}::{ty}", bare_name(&p.name)),
        None => format!("{} => {expr}", bare_name(&p.name)),
    };

    for p in parameters {
        match p.direction {
            Direction::ReturnValue => continue,
            Direction::Output => {
                has_outputs = true;
                args.push(argument(p, "NULL".to_string()));
            }
            Direction::InputOutput => {
                has_outputs = true;
                values.push(p.value.clone().unwrap_or_default());
                args.push(argument(p, format!("${}", values.len())));
            }
            Direction::Input => {
                if let Some(value) = &p.value {
                    values.push(value.clone());
                    args.push(argument(p, format!("${}", values.len())));
                }
            }
        }
    }

    PostgresCall {
        sql: format!("CALL {procedure}({})", args.join(", ")),
        values,
        has_outputs,
    }
}

/// A MySQL procedure or function invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MySqlCall {
    /// Statements initializing the output session variables.
    pub setup: Vec<(String, Value)>,
    pub sql: String,
    pub values: Vec<Value>,
    /// Reads the output session variables back.
    pub outputs_sql: Option<String>,
    pub is_function: bool,
}

/// Build a `CALL` (or `SELECT` for functions) with session variables for
/// output arguments. MySQL has no parameter defaults; absent inputs are NULL.
pub(crate) fn mysql_call(procedure: &str, parameters: &[Parameter]) -> MySqlCall {
    let is_function = parameters
        .iter()
        .any(|p| p.direction == Direction::ReturnValue);
    let mut setup = Vec::new();
    let mut args = Vec::new();
    let mut values = Vec::new();
    let mut reads = Vec::new();

    for p in parameters {
        let name = bare_name(&p.name);
        let variable: String = format!("@{MYSQL_OUT_PREFIX}{name}")
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '@')
            .collect();
        match p.direction {
            Direction::ReturnValue => continue,
            Direction::Input => {
                values.push(p.value.clone().unwrap_or_default());
                args.push("?".to_string());
            }
            Direction::Output | Direction::InputOutput => {
                let initial = if p.direction == Direction::InputOutput {
                    p.value.clone().unwrap_or_default()
                } else {
                    Value::Null
                };
                setup.push((format!("SET {variable} = ?"), initial));
                reads.push(format!("{variable} AS `{name}`"));
                args.push(variable);
            }
        }
    }

    let sql = if is_function {
        format!("SELECT {procedure}({}) AS `{RETURN_VALUE_NAME}`", args.join(", "))
    } else {
        format!("CALL {procedure}({})", args.join(", "))
    };
    let outputs_sql = (!reads.is_empty()).then(|| format!("SELECT {}", reads.join(", ")));

    MySqlCall {
        setup,
        sql,
        values,
        outputs_sql,
        is_function,
    }
}

/// Copy the first row of `table` into the output slots, by column name.
pub(crate) fn apply_output_row(table: &DataTable, parameters: &mut [Parameter]) {
    let Some(row) = table.rows().first() else {
        return;
    };
    for p in parameters
        .iter_mut()
        .filter(|p| matches!(p.direction, Direction::Output | Direction::InputOutput))
    {
        if let Some(value) = row.get_by_name(bare_name(&p.name)) {
            p.value = Some(value.clone());
        }
    }
}

/// Split `schema.name`; surrounding quotes are removed.
pub(crate) fn split_procedure_name(procedure: &str) -> (Option<&str>, &str) {
    fn unquote(s: &str) -> &str {
        s.trim()
            .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
    }
    match procedure.rsplit_once('.') {
        Some((schema, name)) => (Some(unquote(schema)), unquote(name)),
        None => (None, unquote(procedure)),
    }
}

/// Turn `information_schema.parameters` rows into parameter declarations.
///
/// Expects the columns `parameter_name`, `parameter_mode`, `data_type` and
/// `ordinal_position`, plus an optional `server_type` used to cast
/// arguments. Position 0 is a function's return value.
pub(crate) fn parameters_from_metadata(metadata: &DataTable) -> Vec<Parameter> {
    let text = |v: Option<&Value>| match v {
        Some(Value::Null) | None => None,
        Some(v) => Some(v.to_string()),
    };

    metadata
        .rows()
        .iter()
        .map(|row| {
            let ordinal = match row.get_by_name("ordinal_position") {
                Some(Value::Int(v)) => *v,
                Some(Value::String(s)) => s.parse().unwrap_or(1),
                _ => 1,
            };
            let mode = text(row.get_by_name("parameter_mode"));
            let direction = if ordinal == 0 {
                Direction::ReturnValue
            } else {
                Direction::from_parameter_mode(mode.as_deref().or(Some("IN")))
            };
            let name = text(row.get_by_name("parameter_name"))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| {
                    if direction == Direction::ReturnValue {
                        RETURN_VALUE_NAME.to_string()
                    } else {
                        format!("p{ordinal}")
                    }
                });
            let native_type = text(row.get_by_name("data_type"))
                .map(|t| NativeType::from_type_name(&t))
                .filter(|t| *t != NativeType::Variant);
            let parameter = Parameter::declared(name, direction, native_type);
            match text(row.get_by_name("server_type")) {
                Some(ty) => parameter.with_server_type(ty),
                None => parameter,
            }
        })
        .collect()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;

    pub async fn fetch_table(
        conn: &mut MySqlConnection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<DataTable, sqlx::Error> {
        // When there are no values, use raw SQL to avoid prepared statement issues
        let rows = if values.is_empty() {
            sqlx::Executor::fetch_all(&mut *conn, sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_mysql_value(query, value);
            }
            query.fetch_all(&mut *conn).await?
        };
        rows_to_table(&rows)
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<u64, sqlx::Error> {
        // Some SQL like CREATE PROCEDURE doesn't support prepared statements
        let result = if values.is_empty() {
            sqlx::Executor::execute(&mut *conn, sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_mysql_value(query, value);
            }
            query.execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn parameter_metadata(
        conn: &mut MySqlConnection,
        schema: Option<&str>,
        name: &str,
    ) -> Result<(bool, DataTable), sqlx::Error> {
        let schema = schema.map(str::to_string);
        let routines = sqlx::query(
            "SELECT COUNT(*) FROM information_schema.ROUTINES \
             WHERE ROUTINE_NAME = ? AND ROUTINE_SCHEMA = COALESCE(?, DATABASE())",
        )
        .bind(name)
        .bind(schema.clone())
        .fetch_all(&mut *conn)
        .await?;
        let found = matches!(rows_to_table(&routines)?.scalar(), Some(Value::Int(n)) if *n > 0);

        let rows = sqlx::query(
            "SELECT CAST(PARAMETER_NAME AS CHAR) AS parameter_name, \
                    CAST(PARAMETER_MODE AS CHAR) AS parameter_mode, \
                    CAST(DATA_TYPE AS CHAR) AS data_type, \
                    CAST(ORDINAL_POSITION AS SIGNED) AS ordinal_position \
             FROM information_schema.PARAMETERS \
             WHERE SPECIFIC_NAME = ? AND SPECIFIC_SCHEMA = COALESCE(?, DATABASE()) \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(name)
        .bind(schema)
        .fetch_all(&mut *conn)
        .await?;
        Ok((found, rows_to_table(&rows)?))
    }
}

mod postgres {
    use super::*;

    pub async fn fetch_table(
        conn: &mut PgConnection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<DataTable, sqlx::Error> {
        let rows = if values.is_empty() {
            sqlx::Executor::fetch_all(&mut *conn, sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_postgres_value(query, value);
            }
            query.fetch_all(&mut *conn).await?
        };
        rows_to_table(&rows)
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<u64, sqlx::Error> {
        let result = if values.is_empty() {
            sqlx::Executor::execute(&mut *conn, sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_postgres_value(query, value);
            }
            query.execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn parameter_metadata(
        conn: &mut PgConnection,
        schema: Option<&str>,
        name: &str,
    ) -> Result<(bool, DataTable), sqlx::Error> {
        let schema = schema.map(str::to_string);
        let routines = sqlx::query(
            "SELECT COUNT(*)::int8 FROM information_schema.routines \
             WHERE routine_name = $1 AND routine_schema = COALESCE($2, current_schema())",
        )
        .bind(name)
        .bind(schema.clone())
        .fetch_all(&mut *conn)
        .await?;
        let found = matches!(rows_to_table(&routines)?.scalar(), Some(Value::Int(n)) if *n > 0);

        let rows = sqlx::query(
            "SELECT p.parameter_name::text AS parameter_name, \
                    p.parameter_mode::text AS parameter_mode, \
                    p.data_type::text AS data_type, \
                    p.ordinal_position::int8 AS ordinal_position, \
                    CASE WHEN p.udt_schema = 'pg_catalog' THEN p.udt_name::text \
                         ELSE quote_ident(p.udt_schema::text) || '.' || quote_ident(p.udt_name::text) \
                    END AS server_type \
             FROM information_schema.parameters p \
             JOIN information_schema.routines r \
               ON p.specific_schema = r.specific_schema AND p.specific_name = r.specific_name \
             WHERE r.routine_name = $1 AND r.routine_schema = COALESCE($2, current_schema()) \
             ORDER BY p.ordinal_position",
        )
        .bind(name)
        .bind(schema)
        .fetch_all(&mut *conn)
        .await?;
        Ok((found, rows_to_table(&rows)?))
    }
}

mod sqlite {
    use super::*;

    pub async fn fetch_table(
        conn: &mut SqliteConnection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<DataTable, sqlx::Error> {
        let rows = if values.is_empty() {
            sqlx::Executor::fetch_all(&mut *conn, sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_sqlite_value(query, value);
            }
            query.fetch_all(&mut *conn).await?
        };
        rows_to_table(&rows)
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<u64, sqlx::Error> {
        let result = if values.is_empty() {
            sqlx::Executor::execute(&mut *conn, sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for value in values {
                query = bind_sqlite_value(query, value);
            }
            query.execute(&mut *conn).await?
        };
        Ok(result.rows_affected())
    }
}

/// Creates [`DbConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

impl Connector for SqlxConnector {
    fn connect(&self, connection_string: &str) -> DriverResult<Box<dyn Connection>> {
        Ok(Box::new(DbConnection::new(connection_string)?))
    }
}

/// Whether `a` and `b` name the same parameter, ignoring any `@` prefix.
pub fn same_parameter(a: &str, b: &str) -> bool {
    names_equal(bare_name(a), bare_name(b))
}
