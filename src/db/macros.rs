//! Database dispatch macros for reducing code duplication.
//!
//! The sqlx-backed connection is an enum over the three supported backends.
//! The dispatch macro generates the match over its variants so each
//! operation reads as one arm per backend.

use std::fmt;

/// Database backend type for dispatch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    MySql,
    Postgres,
    SQLite,
}

impl DatabaseType {
    /// Parse the backend from a connection string's scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim_start().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Whether the backend supports stored procedures.
    pub fn supports_procedures(&self) -> bool {
        !matches!(self, Self::SQLite)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Macro for generating backend dispatch match arms.
///
/// This macro generates match arms for `Backend` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(backend, {
///     MySql(c) => mysql::execute(c, sql),
///     Postgres(c) => postgres::execute(c, sql),
///     SQLite(c) => sqlite::execute(c, sql),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($backend:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $backend {
            $(
                $crate::db::connection::Backend::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_connection_string() {
        assert_eq!(
            DatabaseType::from_connection_string("postgres://u:p@localhost/db"),
            Some(DatabaseType::Postgres)
        );
        assert_eq!(
            DatabaseType::from_connection_string("PostgreSQL://localhost/db"),
            Some(DatabaseType::Postgres)
        );
        assert_eq!(
            DatabaseType::from_connection_string("mariadb://localhost/db"),
            Some(DatabaseType::MySql)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlite::memory:"),
            Some(DatabaseType::SQLite)
        );
        assert_eq!(DatabaseType::from_connection_string("Server=.;"), None);
    }

    #[test]
    fn test_database_type_display() {
        assert_eq!(DatabaseType::Postgres.to_string(), "PostgreSQL");
        assert!(!DatabaseType::SQLite.supports_procedures());
        assert!(DatabaseType::MySql.supports_procedures());
    }
}
