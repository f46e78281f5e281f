//! Parameter-related data models.
//!
//! This module defines command parameters, their directions and the native
//! type catalogue used for explicit type overrides and derived parameters.

use crate::models::{Value, ValueKind};
use serde::{Deserialize, Serialize};

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl Direction {
    /// Parse the parameter mode reported by `information_schema.parameters`.
    pub fn from_parameter_mode(mode: Option<&str>) -> Self {
        match mode.map(|m| m.trim().to_ascii_uppercase()).as_deref() {
            Some("OUT") => Self::Output,
            Some("INOUT") => Self::InputOutput,
            Some("IN") => Self::Input,
            // MySQL reports a function's return value with a NULL mode.
            _ => Self::ReturnValue,
        }
    }

    /// Whether the caller supplies a value for this parameter.
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }

    /// Whether the database writes a value back into this parameter.
    pub fn returns_output(&self) -> bool {
        !matches!(self, Self::Input)
    }
}

/// Coarse classification of native types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleDataType {
    #[default]
    Unknown,
    Numeric,
    String,
    Boolean,
    DateTime,
    Guid,
}

impl SimpleDataType {
    /// Classify a Rust-side value kind.
    pub fn of_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int | ValueKind::Float | ValueKind::Decimal => Self::Numeric,
            ValueKind::Bool => Self::Boolean,
            ValueKind::Guid => Self::Guid,
            ValueKind::DateTime | ValueKind::DateTimeOffset => Self::DateTime,
            _ => Self::String,
        }
    }
}

/// Native database type of a parameter or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    BigInt,
    Int,
    SmallInt,
    TinyInt,
    Bit,
    Decimal,
    Money,
    SmallMoney,
    Float,
    Real,
    Date,
    DateTime,
    DateTime2,
    SmallDateTime,
    DateTimeOffset,
    Time,
    UniqueIdentifier,
    Char,
    NChar,
    VarChar,
    NVarChar,
    Text,
    NText,
    Binary,
    VarBinary,
    Json,
    Variant,
}

impl NativeType {
    /// Classify into a simple data type.
    pub fn simple_type(&self) -> SimpleDataType {
        match self {
            Self::BigInt
            | Self::Decimal
            | Self::Float
            | Self::Int
            | Self::Money
            | Self::Real
            | Self::SmallInt
            | Self::SmallMoney
            | Self::TinyInt => SimpleDataType::Numeric,
            Self::Bit => SimpleDataType::Boolean,
            Self::DateTime
            | Self::Date
            | Self::DateTime2
            | Self::DateTimeOffset
            | Self::SmallDateTime => SimpleDataType::DateTime,
            Self::UniqueIdentifier => SimpleDataType::Guid,
            _ => SimpleDataType::String,
        }
    }

    /// The value kind a parameter of this type is bound as.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::BigInt | Self::Int | Self::SmallInt | Self::TinyInt => ValueKind::Int,
            Self::Decimal | Self::Money | Self::SmallMoney => ValueKind::Decimal,
            Self::Float | Self::Real => ValueKind::Float,
            Self::Bit => ValueKind::Bool,
            Self::Date | Self::DateTime | Self::DateTime2 | Self::SmallDateTime => {
                ValueKind::DateTime
            }
            Self::DateTimeOffset => ValueKind::DateTimeOffset,
            Self::UniqueIdentifier => ValueKind::Guid,
            Self::Binary | Self::VarBinary => ValueKind::Bytes,
            Self::Json => ValueKind::Json,
            Self::Variant => ValueKind::Null,
            _ => ValueKind::String,
        }
    }

    /// Map a database type name to a native type.
    ///
    /// Unknown names map to `Variant`, which binds values unchanged.
    pub fn from_type_name(type_name: &str) -> Self {
        let lower = type_name.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or_default().trim();

        match base {
            "bigint" | "int8" | "bigserial" => Self::BigInt,
            "int" | "integer" | "int4" | "serial" | "mediumint" => Self::Int,
            "smallint" | "int2" | "smallserial" => Self::SmallInt,
            "tinyint" => Self::TinyInt,
            "bit" | "bool" | "boolean" => Self::Bit,
            "decimal" | "numeric" => Self::Decimal,
            "money" => Self::Money,
            "smallmoney" => Self::SmallMoney,
            "float" | "float8" | "double" | "double precision" => Self::Float,
            "real" | "float4" => Self::Real,
            "date" => Self::Date,
            "datetime" | "timestamp" | "timestamp without time zone" => Self::DateTime,
            "datetime2" => Self::DateTime2,
            "smalldatetime" => Self::SmallDateTime,
            "datetimeoffset" | "timestamptz" | "timestamp with time zone" => {
                Self::DateTimeOffset
            }
            "time" | "time without time zone" => Self::Time,
            "uniqueidentifier" | "uuid" => Self::UniqueIdentifier,
            "char" | "character" | "bpchar" => Self::Char,
            "nchar" => Self::NChar,
            "varchar" | "character varying" => Self::VarChar,
            "nvarchar" => Self::NVarChar,
            "text" | "mediumtext" | "longtext" | "tinytext" => Self::Text,
            "ntext" => Self::NText,
            "binary" => Self::Binary,
            "varbinary" | "bytea" | "blob" | "longblob" | "mediumblob" => Self::VarBinary,
            "json" | "jsonb" => Self::Json,
            _ => Self::Variant,
        }
    }
}

/// A command parameter bound to a prepared statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub native_type: Option<NativeType>,
    /// Type name as reported by the server when the parameter was derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    /// `None` means "not supplied"; the database default applies.
    #[serde(default)]
    pub value: Option<Value>,
}

impl Parameter {
    /// Create an input parameter with a value.
    pub fn input(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Input,
            native_type: None,
            server_type: None,
            value: Some(value.into()),
        }
    }

    /// Create a parameter declaration without a value.
    pub fn declared(
        name: impl Into<String>,
        direction: Direction,
        native_type: Option<NativeType>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            native_type,
            server_type: None,
            value: None,
        }
    }

    /// Record the server's own name for the parameter's type.
    pub fn with_server_type(mut self, server_type: impl Into<String>) -> Self {
        self.server_type = Some(server_type.into());
        self
    }

    /// Whether this parameter has the given name (case-insensitive).
    pub fn is_named(&self, name: &str) -> bool {
        crate::models::names_equal(&self.name, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_parameter_mode() {
        assert_eq!(Direction::from_parameter_mode(Some("IN")), Direction::Input);
        assert_eq!(Direction::from_parameter_mode(Some("out")), Direction::Output);
        assert_eq!(
            Direction::from_parameter_mode(Some("INOUT")),
            Direction::InputOutput
        );
        assert_eq!(
            Direction::from_parameter_mode(None),
            Direction::ReturnValue
        );
    }

    #[test]
    fn test_simple_type_classification() {
        assert_eq!(NativeType::Money.simple_type(), SimpleDataType::Numeric);
        assert_eq!(NativeType::Bit.simple_type(), SimpleDataType::Boolean);
        assert_eq!(
            NativeType::DateTimeOffset.simple_type(),
            SimpleDataType::DateTime
        );
        assert_eq!(
            NativeType::UniqueIdentifier.simple_type(),
            SimpleDataType::Guid
        );
        assert_eq!(NativeType::NVarChar.simple_type(), SimpleDataType::String);
        assert_eq!(
            SimpleDataType::of_kind(ValueKind::Float),
            SimpleDataType::Numeric
        );
    }

    #[test]
    fn test_native_type_from_type_name() {
        assert_eq!(NativeType::from_type_name("INT4"), NativeType::Int);
        assert_eq!(
            NativeType::from_type_name("character varying(50)"),
            NativeType::VarChar
        );
        assert_eq!(
            NativeType::from_type_name("timestamp with time zone"),
            NativeType::DateTimeOffset
        );
        assert_eq!(NativeType::from_type_name("geometry"), NativeType::Variant);
    }

    #[test]
    fn test_value_kind_for_binding() {
        assert_eq!(NativeType::TinyInt.value_kind(), ValueKind::Int);
        assert_eq!(NativeType::Decimal.value_kind(), ValueKind::Decimal);
        assert_eq!(NativeType::Real.value_kind(), ValueKind::Float);
        assert_eq!(NativeType::VarBinary.value_kind(), ValueKind::Bytes);
    }

    #[test]
    fn test_parameter_name_is_case_insensitive() {
        let p = Parameter::input("@CustomerId", 5);
        assert!(p.is_named("@customerid"));
        assert!(!p.is_named("@customer"));
    }
}
