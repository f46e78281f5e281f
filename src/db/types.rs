//! Decoding of driver rows into [`DataTable`]s.
//!
//! Each column's declared type name is first classified into a
//! [`TypeCategory`]; a per-backend decoder then extracts the cell as a
//! [`Value`] of the matching kind. Cells that cannot be decoded as their
//! category fall back to text where the backend allows it; anything else
//! is a decode error, never a silent NULL. DECIMAL and NUMERIC are read
//! into [`Decimal`] so every digit survives.
//!
//! SQLite columns are dynamically typed, so its decoder follows the storage
//! class of each cell and only uses the declared type to recognise booleans.

use crate::db::DatabaseType;
use crate::models::{Column as ColumnInfo, DataTable, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};

/// What kind of value a column type decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Money,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify a column type name as reported by the driver.
///
/// Length, precision and array suffixes are ignored: `varchar(20)` is text,
/// `numeric(10,2)` is decimal.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.trim().to_lowercase();
    let base = lower.split(['(', '[']).next().unwrap_or_default().trim();

    match base {
        // SQLite's NUMERIC affinity stores floats.
        "numeric" if db == DatabaseType::SQLite => TypeCategory::Float,
        "money" if db == DatabaseType::Postgres => TypeCategory::Money,
        "bool" | "boolean" => TypeCategory::Boolean,
        "real" | "float4" | "float8" | "double precision" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "timestamptz" | "timestamp with time zone" => TypeCategory::TimestampTz,
        "timestamp" | "timestamp without time zone" | "datetime" => TypeCategory::Timestamp,
        "date" => TypeCategory::Date,
        "time" | "time without time zone" => TypeCategory::Time,
        "bytea" => TypeCategory::Binary,
        "name" | "interval" | "point" => TypeCategory::Text,
        _ if base.contains("decimal") || base.contains("numeric") => TypeCategory::Decimal,
        _ if base.contains("int") || base.contains("serial") => TypeCategory::Integer,
        _ if base.contains("float") || base.contains("double") => TypeCategory::Float,
        _ if base.contains("blob") || base.contains("binary") => TypeCategory::Binary,
        _ if base.contains("char") || base.contains("text") => TypeCategory::Text,
        _ => TypeCategory::Unknown,
    }
}

/// A fetched row that can be turned into table cells.
pub trait DecodeRow {
    fn column_infos(&self) -> Vec<ColumnInfo>;
    fn decode_values(&self) -> Result<Vec<Value>, sqlx::Error>;
}

macro_rules! impl_decode_row {
    ($row:ty, $db:expr, $decoder:path) => {
        impl DecodeRow for $row {
            fn column_infos(&self) -> Vec<ColumnInfo> {
                self.columns()
                    .iter()
                    // sqlx does not report nullability of result columns.
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name(), true))
                    .collect()
            }

            fn decode_values(&self) -> Result<Vec<Value>, sqlx::Error> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        $decoder(self, idx, categorize_type(col.type_info().name(), $db))
                    })
                    .collect()
            }
        }
    };
}

impl_decode_row!(MySqlRow, DatabaseType::MySql, mysql::decode_column);
impl_decode_row!(PgRow, DatabaseType::Postgres, postgres::decode_column);
impl_decode_row!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

/// Build a table from fetched rows.
///
/// sqlx only exposes column metadata through rows, so an empty row set
/// produces a table without columns. A cell that cannot be decoded fails
/// the whole table.
pub fn rows_to_table<R: DecodeRow>(rows: &[R]) -> Result<DataTable, sqlx::Error> {
    let columns = rows.first().map(R::column_infos).unwrap_or_default();
    let values = rows
        .iter()
        .map(R::decode_values)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DataTable::new(columns, values))
}

type Cell = Result<Value, sqlx::Error>;

fn time_value(t: NaiveTime) -> Value {
    Value::String(t.format("%H:%M:%S%.f").to_string())
}

fn date_value(d: NaiveDate) -> Value {
    Value::DateTime(d.and_time(NaiveTime::MIN))
}

/// Read column `idx` as `T`; a null cell is `None`.
fn read<'r, R, T>(row: &'r R, idx: usize) -> Result<Option<T>, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx)
}

/// Like [`read`], for trying several Rust types in turn.
fn attempt<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    read(row, idx).ok().flatten()
}

fn is_null<R>(row: &R, idx: usize) -> Result<bool, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
{
    Ok(row.try_get_raw(idx)?.is_null())
}

fn or_null<T>(value: Option<T>, wrap: impl FnOnce(T) -> Value) -> Value {
    value.map_or(Value::Null, wrap)
}

fn unsupported(idx: usize, type_name: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: idx.to_string(),
        source: format!("unsupported column type {type_name}").into(),
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::MySql;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Cell {
        if is_null(row, idx)? {
            return Ok(Value::Null);
        }
        Ok(match category {
            TypeCategory::Decimal => or_null(read::<_, Decimal>(row, idx)?, Value::Decimal),
            TypeCategory::Integer => return integer(row, idx),
            TypeCategory::Boolean => or_null(read::<_, bool>(row, idx)?, Value::Bool),
            TypeCategory::Float => match attempt::<_, f64>(row, idx) {
                Some(v) => Value::Float(v),
                None => or_null(read::<_, f32>(row, idx)?, |v| Value::Float(v.into())),
            },
            TypeCategory::Binary => or_null(read(row, idx)?, Value::Bytes),
            TypeCategory::Json => or_null(read(row, idx)?, Value::Json),
            TypeCategory::Timestamp | TypeCategory::TimestampTz => {
                match attempt::<_, NaiveDateTime>(row, idx)
                    .or_else(|| attempt::<_, DateTime<Utc>>(row, idx).map(|v| v.naive_utc()))
                {
                    Some(v) => Value::DateTime(v),
                    None => return text(row, idx),
                }
            }
            TypeCategory::Date => match attempt::<_, NaiveDate>(row, idx) {
                Some(v) => date_value(v),
                None => return text(row, idx),
            },
            TypeCategory::Time => match attempt::<_, NaiveTime>(row, idx) {
                Some(v) => time_value(v),
                None => return text(row, idx),
            },
            _ => return text(row, idx),
        })
    }

    /// MySQL integers come in signed and unsigned widths; try each until one
    /// decodes. Unsigned 64-bit values beyond `i64` are kept as text.
    fn integer(row: &MySqlRow, idx: usize) -> Cell {
        let signed = attempt::<_, i8>(row, idx)
            .map(i64::from)
            .or_else(|| attempt::<_, i16>(row, idx).map(i64::from))
            .or_else(|| attempt::<_, i32>(row, idx).map(i64::from))
            .or_else(|| attempt::<_, i64>(row, idx))
            .or_else(|| attempt::<_, u8>(row, idx).map(i64::from))
            .or_else(|| attempt::<_, u16>(row, idx).map(i64::from))
            .or_else(|| attempt::<_, u32>(row, idx).map(i64::from));
        if let Some(v) = signed {
            return Ok(Value::Int(v));
        }
        Ok(or_null(read::<_, u64>(row, idx)?, |v| {
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(v.to_string()))
        }))
    }

    /// Text, or the raw bytes of types sqlx has no mapping for. VARBINARY
    /// results of string functions come back as text when they are UTF-8.
    fn text(row: &MySqlRow, idx: usize) -> Cell {
        if let Some(v) = attempt::<_, String>(row, idx) {
            return Ok(Value::String(v));
        }
        let raw = row.try_get_raw(idx)?;
        let bytes = <Vec<u8> as Decode<MySql>>::decode(raw).map_err(|source| {
            sqlx::Error::ColumnDecode {
                index: idx.to_string(),
                source,
            }
        })?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        })
    }
}

mod postgres {
    use super::*;
    use sqlx::Postgres;
    use sqlx::postgres::types::PgMoney;
    use sqlx::postgres::{PgTypeKind, PgValueFormat};

    /// Scale of `money` under the usual two-digit `lc_monetary` locales.
    const MONEY_SCALE: u32 = 2;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Cell {
        if is_null(row, idx)? {
            return Ok(Value::Null);
        }
        Ok(match category {
            TypeCategory::Decimal => or_null(read::<_, Decimal>(row, idx)?, Value::Decimal),
            TypeCategory::Money => or_null(read::<_, PgMoney>(row, idx)?, |m| {
                Value::Decimal(m.to_decimal(MONEY_SCALE))
            }),
            TypeCategory::Integer => match attempt::<_, i16>(row, idx)
                .map(i64::from)
                .or_else(|| attempt::<_, i32>(row, idx).map(i64::from))
            {
                Some(v) => Value::Int(v),
                None => or_null(read::<_, i64>(row, idx)?, Value::Int),
            },
            TypeCategory::Boolean => or_null(read(row, idx)?, Value::Bool),
            TypeCategory::Float => match attempt::<_, f64>(row, idx) {
                Some(v) => Value::Float(v),
                None => or_null(read::<_, f32>(row, idx)?, |v| Value::Float(v.into())),
            },
            TypeCategory::Binary => or_null(read(row, idx)?, Value::Bytes),
            TypeCategory::Json => or_null(read(row, idx)?, Value::Json),
            TypeCategory::Uuid => or_null(read(row, idx)?, Value::Guid),
            TypeCategory::Timestamp => or_null(read(row, idx)?, Value::DateTime),
            TypeCategory::TimestampTz => {
                or_null(read::<_, DateTime<Utc>>(row, idx)?, Value::from)
            }
            TypeCategory::Date => or_null(read(row, idx)?, date_value),
            TypeCategory::Time => or_null(read(row, idx)?, time_value),
            _ => return text(row, idx),
        })
    }

    /// Text-family columns, plus enums and anything the server sent in
    /// text format. Other binary-encoded types have no portable text form.
    fn text(row: &PgRow, idx: usize) -> Cell {
        if let Some(v) = attempt::<_, String>(row, idx) {
            return Ok(Value::String(v));
        }
        let raw = row.try_get_raw(idx)?;
        let info = raw.type_info().into_owned();
        let textual = matches!(raw.format(), PgValueFormat::Text)
            || matches!(info.kind(), PgTypeKind::Enum(_));
        if !textual {
            return Err(unsupported(idx, info.name()));
        }
        <String as Decode<Postgres>>::decode(raw)
            .map(Value::String)
            .map_err(|source| sqlx::Error::ColumnDecode {
                index: idx.to_string(),
                source,
            })
    }
}

mod sqlite {
    use super::*;

    /// Decode by storage class; the declared type only marks booleans.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Cell {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_uppercase();

        Ok(match storage.as_str() {
            "INTEGER" if category == TypeCategory::Boolean => {
                or_null(read(row, idx)?, Value::Bool)
            }
            "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => or_null(read(row, idx)?, Value::Int),
            "REAL" | "FLOAT" | "DOUBLE" => or_null(read(row, idx)?, Value::Float),
            "BLOB" => or_null(read(row, idx)?, Value::Bytes),
            _ => or_null(read(row, idx)?, Value::String),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_ignores_modifiers() {
        let cases = [
            ("INT", DatabaseType::MySql, TypeCategory::Integer),
            ("bigint unsigned", DatabaseType::MySql, TypeCategory::Integer),
            ("varchar(20)", DatabaseType::MySql, TypeCategory::Text),
            ("NUMERIC(10,2)", DatabaseType::Postgres, TypeCategory::Decimal),
            ("int4[]", DatabaseType::Postgres, TypeCategory::Integer),
            ("TINYTEXT", DatabaseType::MySql, TypeCategory::Text),
            ("TINYBLOB", DatabaseType::MySql, TypeCategory::Binary),
        ];
        for (name, db, expected) in cases {
            assert_eq!(categorize_type(name, db), expected, "{name}");
        }
    }

    #[test]
    fn test_categorize_backend_specific() {
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::Postgres),
            TypeCategory::TimestampTz
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySql),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("interval", DatabaseType::Postgres),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("uuid", DatabaseType::Postgres),
            TypeCategory::Uuid
        );
        assert_eq!(
            categorize_type("GEOMETRY", DatabaseType::MySql),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_money_is_postgres_only() {
        assert_eq!(
            categorize_type("MONEY", DatabaseType::Postgres),
            TypeCategory::Money
        );
        assert_eq!(
            categorize_type("money", DatabaseType::MySql),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_empty_rows_make_empty_table() {
        let rows: Vec<SqliteRow> = Vec::new();
        let table = rows_to_table(&rows).unwrap();
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }
}
