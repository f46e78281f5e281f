//! Data models for db-command.
//!
//! This module re-exports all model types used throughout the crate.

pub mod parameter;
pub mod table;
pub mod value;

// Re-export commonly used types
pub use parameter::{Direction, NativeType, Parameter, SimpleDataType};
pub use table::{Column, DataRow, DataSet, DataTable};
pub use value::{FromValue, Value, ValueKind};

/// Compare two names the way parameter and column names are compared:
/// case-insensitively, including non-ASCII letters.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.eq_ignore_ascii_case(b)
        || a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
}
