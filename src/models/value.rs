//! Dynamically typed cell and parameter values.
//!
//! `Value` is what the driver hands back for every column and what the
//! parameter store holds for every argument. `FromValue` is the default
//! coercion used when a value is assigned to a typed field.

use crate::error::ConversionError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// A database value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    #[default]
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Exact DECIMAL/NUMERIC value, serialized as its text form.
    /// Declared after `String` so untagged input text stays a string.
    Decimal(Decimal),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Guid(Uuid),
    Json(JsonValue),
}

/// The kind of a value, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    String,
    Bytes,
    DateTime,
    DateTimeOffset,
    Guid,
    Json,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::DateTime => "datetime",
            Self::DateTimeOffset => "datetimeoffset",
            Self::Guid => "guid",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATETIME_OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::DateTimeOffset(_) => ValueKind::DateTimeOffset,
            Self::Guid(_) => ValueKind::Guid,
            Self::Json(_) => ValueKind::Json,
        }
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Convert this value to another kind.
    ///
    /// Null converts to null regardless of the target. Everything else
    /// follows the usual database-client rules: numbers widen and narrow
    /// with range checks, strings are parsed, 0/1 become booleans.
    pub fn coerce(self, target: ValueKind) -> Result<Value, ConversionError> {
        if self.is_null() || self.kind() == target || target == ValueKind::Null {
            return Ok(self);
        }
        let from = self.kind();
        let fail = |detail: Option<String>| ConversionError::new(from, target.name(), detail);

        let converted = match (self, target) {
            (Value::Int(v), ValueKind::Bool) => Value::Bool(v != 0),
            (Value::Float(v), ValueKind::Bool) => Value::Bool(v != 0.0),
            (Value::Decimal(v), ValueKind::Bool) => Value::Bool(!v.is_zero()),
            (Value::String(s), ValueKind::Bool) => Value::Bool(parse_bool(&s).ok_or_else(|| fail(Some(s)))?),

            (Value::Bool(v), ValueKind::Int) => Value::Int(i64::from(v)),
            (Value::Float(v), ValueKind::Int) => {
                let rounded = v.round_ties_even();
                if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
                    return Err(fail(Some(format!("{v} is out of range"))));
                }
                Value::Int(rounded as i64)
            }
            (Value::Decimal(v), ValueKind::Int) => {
                match v.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven).to_i64() {
                    Some(n) => Value::Int(n),
                    None => return Err(fail(Some(format!("{v} is out of range")))),
                }
            }
            (Value::String(s), ValueKind::Int) => match s.trim().parse::<i64>() {
                Ok(v) => Value::Int(v),
                Err(e) => return Err(fail(Some(format!("'{s}': {e}")))),
            },

            (Value::Bool(v), ValueKind::Float) => Value::Float(if v { 1.0 } else { 0.0 }),
            (Value::Int(v), ValueKind::Float) => Value::Float(v as f64),
            (Value::Decimal(v), ValueKind::Float) => match v.to_f64() {
                Some(f) => Value::Float(f),
                None => return Err(fail(Some(v.to_string()))),
            },
            (Value::String(s), ValueKind::Float) => match s.trim().parse::<f64>() {
                Ok(v) => Value::Float(v),
                Err(e) => return Err(fail(Some(format!("'{s}': {e}")))),
            },

            (Value::Bool(v), ValueKind::Decimal) => {
                Value::Decimal(if v { Decimal::ONE } else { Decimal::ZERO })
            }
            (Value::Int(v), ValueKind::Decimal) => Value::Decimal(Decimal::from(v)),
            (Value::Float(v), ValueKind::Decimal) => match Decimal::try_from(v) {
                Ok(d) => Value::Decimal(d),
                Err(e) => return Err(fail(Some(format!("{v}: {e}")))),
            },
            (Value::String(s), ValueKind::Decimal) => match s.trim().parse::<Decimal>() {
                Ok(d) => Value::Decimal(d),
                Err(e) => return Err(fail(Some(format!("'{s}': {e}")))),
            },

            (Value::Bytes(_), ValueKind::String) => return Err(fail(None)),
            (other, ValueKind::String) => Value::String(other.to_string()),

            (Value::String(s), ValueKind::Bytes) => Value::Bytes(s.into_bytes()),
            (Value::Guid(g), ValueKind::Bytes) => Value::Bytes(g.as_bytes().to_vec()),

            (Value::String(s), ValueKind::DateTime) => {
                Value::DateTime(parse_datetime(&s).ok_or_else(|| fail(Some(s)))?)
            }
            (Value::DateTimeOffset(v), ValueKind::DateTime) => Value::DateTime(v.naive_local()),

            (Value::String(s), ValueKind::DateTimeOffset) => {
                Value::DateTimeOffset(parse_datetime_offset(&s).ok_or_else(|| fail(Some(s)))?)
            }
            (Value::DateTime(v), ValueKind::DateTimeOffset) => {
                Value::DateTimeOffset(Utc.from_utc_datetime(&v).fixed_offset())
            }

            (Value::String(s), ValueKind::Guid) => match Uuid::parse_str(s.trim()) {
                Ok(g) => Value::Guid(g),
                Err(e) => return Err(fail(Some(format!("'{s}': {e}")))),
            },
            (Value::Bytes(b), ValueKind::Guid) => match Uuid::from_slice(&b) {
                Ok(g) => Value::Guid(g),
                Err(e) => return Err(fail(Some(e.to_string()))),
            },

            (Value::String(s), ValueKind::Json) => match serde_json::from_str(&s) {
                Ok(v) => Value::Json(v),
                Err(e) => return Err(fail(Some(e.to_string()))),
            },
            (other, ValueKind::Json) => match serde_json::to_value(&other) {
                Ok(v) => Value::Json(v),
                Err(e) => return Err(fail(Some(e.to_string()))),
            },

            _ => return Err(fail(None)),
        };
        Ok(converted)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .or_else(|| parse_datetime_offset(s).map(|v| v.naive_local()))
}

fn parse_datetime_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        DATETIME_OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("(null)"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Bytes(v) => {
                f.write_str("0x")?;
                for b in v {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
            Self::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::DateTimeOffset(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f %:z")),
            Self::Guid(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    Uuid => Guid,
    JsonValue => Json,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTimeOffset(value.fixed_offset())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Typed extraction
// =============================================================================

/// Conversion from a database value into a Rust type.
///
/// `Option<T>` is the nullable form of every implementor: null becomes
/// `None`. Non-nullable implementors reject null with a `ConversionError`.
pub trait FromValue: Sized {
    /// The value kind the source is coerced to before extraction.
    const KIND: ValueKind;
    /// Whether a database null is an acceptable value.
    const NULLABLE: bool = false;

    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

fn null_error(target: &'static str) -> ConversionError {
    ConversionError::new(
        ValueKind::Null,
        target,
        Some("null cannot be assigned to a non-nullable type".to_string()),
    )
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                const KIND: ValueKind = ValueKind::Int;

                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    let from = value.kind();
                    match value.coerce(ValueKind::Int)? {
                        Value::Int(v) => <$ty>::try_from(v).map_err(|_| {
                            ConversionError::new(
                                from,
                                stringify!($ty),
                                Some(format!("{v} is out of range")),
                            )
                        }),
                        Value::Null => Err(null_error(stringify!($ty))),
                        _ => Err(ConversionError::new(from, stringify!($ty), None)),
                    }
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let from = value.kind();
        match value.coerce(ValueKind::Float)? {
            Value::Float(v) => Ok(v),
            Value::Null => Err(null_error("f64")),
            _ => Err(ConversionError::new(from, "f64", None)),
        }
    }
}

impl FromValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

/// Implements `FromValue` for a type that maps onto exactly one value kind.
macro_rules! impl_from_value_variant {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const KIND: ValueKind = ValueKind::$kind;

                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    let from = value.kind();
                    match value.coerce(ValueKind::$kind)? {
                        Value::$kind(v) => Ok(v),
                        Value::Null => Err(null_error(stringify!($ty))),
                        _ => Err(ConversionError::new(from, stringify!($ty), None)),
                    }
                }
            }
        )*
    };
}

impl_from_value_variant! {
    bool => Bool,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    Uuid => Guid,
    JsonValue => Json,
}

impl FromValue for NaiveDate {
    const KIND: ValueKind = ValueKind::DateTime;

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        NaiveDateTime::from_value(value).map(|v| v.date())
    }
}

impl FromValue for Value {
    const KIND: ValueKind = ValueKind::Null;
    const NULLABLE: bool = true;

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_and_null() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(5).kind(), ValueKind::Int);
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[test]
    fn test_int_narrowing_checks_range() {
        assert_eq!(i32::from_value(Value::Int(123)).unwrap(), 123);
        let err = u8::from_value(Value::Int(300)).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_float_to_int_rounds_half_even() {
        assert_eq!(i32::from_value(Value::Float(2.5)).unwrap(), 2);
        assert_eq!(i32::from_value(Value::Float(3.5)).unwrap(), 4);
    }

    #[test]
    fn test_string_parsing() {
        assert_eq!(f64::from_value(Value::from("12.34")).unwrap(), 12.34);
        assert!(bool::from_value(Value::from("TRUE")).unwrap());
        let dt = NaiveDateTime::from_value(Value::from("2015-10-12 12:12:44")).unwrap();
        assert_eq!(dt.to_string(), "2015-10-12 12:12:44");
        let dto =
            DateTime::<FixedOffset>::from_value(Value::from("2015-12-12 12:12:12 -08:00")).unwrap();
        assert_eq!(dto.offset().local_minus_utc(), -8 * 3600);
    }

    #[test]
    fn test_decimal_keeps_every_digit() {
        let exact: Decimal = "12345678901234567.89".parse().unwrap();
        let value = Value::Decimal(exact);
        assert_eq!(value.to_string(), "12345678901234567.89");
        assert_eq!(Decimal::from_value(value.clone()).unwrap(), exact);
        assert_eq!(String::from_value(value).unwrap(), "12345678901234567.89");
    }

    #[test]
    fn test_decimal_coercions() {
        let d = |s: &str| Value::Decimal(s.parse().unwrap());
        assert_eq!(f64::from_value(d("12.50")).unwrap(), 12.5);
        assert_eq!(i32::from_value(d("2.5")).unwrap(), 2);
        assert_eq!(i64::from_value(d("-7")).unwrap(), -7);
        assert_eq!(
            Value::from("0.10").coerce(ValueKind::Decimal).unwrap(),
            d("0.10")
        );
        assert_eq!(Value::Int(3).coerce(ValueKind::Decimal).unwrap(), d("3"));
        assert!(bool::from_value(d("1.0")).unwrap());
        assert!(Value::from("abc").coerce(ValueKind::Decimal).is_err());
    }

    #[test]
    fn test_int_to_bool() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(!bool::from_value(Value::Int(0)).unwrap());
    }

    #[test]
    fn test_null_on_non_nullable_fails() {
        assert!(i32::from_value(Value::Null).is_err());
        assert!(String::from_value(Value::Null).is_err());
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_nullable_converts_underlying_type() {
        assert_eq!(
            Option::<f64>::from_value(Value::Int(5)).unwrap(),
            Some(5.0)
        );
    }

    #[test]
    fn test_bytes_do_not_convert_to_string() {
        assert!(String::from_value(Value::Bytes(vec![1, 2])).is_err());
    }

    #[test]
    fn test_display_renders_null_marker() {
        assert_eq!(Value::Null.to_string(), "(null)");
        assert_eq!(Value::Bytes(vec![0xAB, 0x01]).to_string(), "0xAB01");
    }

    #[test]
    fn test_serialize_untagged() {
        let json = serde_json::to_value(vec![Value::Int(1), Value::Null, Value::from("a")]).unwrap();
        assert_eq!(json, serde_json::json!([1, null, "a"]));
    }
}
