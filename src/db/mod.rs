//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The synchronous driver seam (`Connection`, `Connector`)
//! - The sqlx-backed driver for PostgreSQL, MySQL and SQLite
//! - A scriptable in-memory driver
//! - Parameter binding and type mappings
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod connection;
pub mod driver;
pub mod mock;
pub mod params;
pub mod types;

pub use connection::{DbConnection, SqlxConnector};
pub use driver::{
    CommandKind, Connection, Connector, DriverRequest, DriverResponse, ExecuteMode,
    IsolationLevel, SharedConnection,
};
pub use macros::DatabaseType;
pub use mock::{MockConnection, MockConnector, MockHandle, MockResponse};
