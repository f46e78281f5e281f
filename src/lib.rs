//! db-command Library
//!
//! Synchronous execution of stored procedures and SQL commands against
//! PostgreSQL, MySQL and SQLite, with typed materialization of result rows.
//!
//! - [`command`]: commands, their preparation lifecycle, transactions and
//!   readers
//! - [`mapping`]: row to object materialization
//! - [`db`]: the driver seam and its sqlx and in-memory implementations
//! - [`config`]: data settings and the CLI configuration

pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod mapping;
pub mod models;

pub use command::{Command, CommandBehavior, DataReader, Transaction, create_transaction};
pub use config::{Config, DataSettings, LoggingCallback};
pub use error::{DbError, DbResult};
pub use mapping::{Entity, Materializer, Translation};
