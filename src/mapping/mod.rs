//! Row to object materialization.
//!
//! A type takes part in materialization by implementing [`Entity`], usually
//! through the [`entity!`](crate::entity) macro, which records one
//! [`FieldDescriptor`] per field: its name, an optional source column, and
//! setters for the default coercion and for hook overrides.
//!
//! [`Materializer`] turns a [`DataTable`] into a `Vec<T>`. Columns are
//! matched to fields in one of two ways:
//!
//! - **Mapping function**: every column name is passed to a caller-supplied
//!   function returning the field name, if any. Field lookup is exact.
//! - **Field attributes**: a field with a source column takes that column;
//!   other fields match a column of the same name, case-insensitively
//!   unless strict matching is requested.
//!
//! Every assignment first goes through the translation hook, if one is set.

mod hook;

pub use hook::{Translation, TranslationHook};

use crate::error::{ConversionError, DbError, DbResult};
use crate::models::{DataTable, Value, ValueKind, names_equal};
use std::any::{Any, type_name};
use std::fmt;
use tracing::debug;

/// Static description of one mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: &'static str,
    /// Explicit source column, matched case-insensitively.
    pub source: Option<&'static str>,
    /// The field's Rust type as written.
    pub type_name: &'static str,
    pub nullable: bool,
    /// The value kind values are coerced to before assignment.
    pub kind: ValueKind,
}

/// A mapped field with its setters.
pub struct FieldDescriptor<T> {
    pub info: FieldInfo,
    /// Assign a raw value using the default coercion.
    pub set: fn(&mut T, Value) -> Result<(), ConversionError>,
    /// Assign a hook override; the box is handed back on a type mismatch.
    pub set_override: fn(&mut T, Box<dyn Any>) -> Result<(), Box<dyn Any>>,
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.info, f)
    }
}

/// The mapped fields of a type, in declaration order.
#[derive(Debug)]
pub struct Mapping<T> {
    fields: Vec<FieldDescriptor<T>>,
}

impl<T> Mapping<T> {
    pub fn new(fields: Vec<FieldDescriptor<T>>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    /// Look up a field by its exact name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.iter().find(|f| f.info.name == name)
    }
}

/// A type that rows can be materialized into.
pub trait Entity: Default + 'static {
    fn mapping() -> &'static Mapping<Self>;
}

/// Implement [`Entity`] for one or more structs.
///
/// Each field is listed with its type; `=> "COLUMN"` names an explicit
/// source column.
///
/// ```ignore
/// #[derive(Default)]
/// struct Order {
///     id: i64,
///     customer: String,
///     shipped: Option<NaiveDateTime>,
/// }
///
/// db_command::entity! {
///     Order {
///         id: i64 => "ORDER_ID",
///         customer: String,
///         shipped: Option<NaiveDateTime>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    (@source) => {
        None
    };
    (@source $src:literal) => {
        Some($src)
    };
    ($(
        $ty:ident {
            $($field:ident : $fty:ty $(=> $src:literal)?),* $(,)?
        }
    )*) => {
        $(
            impl $crate::mapping::Entity for $ty {
                fn mapping() -> &'static $crate::mapping::Mapping<Self> {
                    static MAPPING: ::std::sync::OnceLock<$crate::mapping::Mapping<$ty>> =
                        ::std::sync::OnceLock::new();
                    MAPPING.get_or_init(|| {
                        $crate::mapping::Mapping::new(vec![
                            $(
                                $crate::mapping::FieldDescriptor {
                                    info: $crate::mapping::FieldInfo {
                                        name: stringify!($field),
                                        source: $crate::entity!(@source $($src)?),
                                        type_name: stringify!($fty),
                                        nullable: <$fty as $crate::models::FromValue>::NULLABLE,
                                        kind: <$fty as $crate::models::FromValue>::KIND,
                                    },
                                    set: |target: &mut $ty,
                                          value: $crate::models::Value|
                                     -> ::std::result::Result<(), $crate::error::ConversionError> {
                                        target.$field =
                                            <$fty as $crate::models::FromValue>::from_value(value)?;
                                        Ok(())
                                    },
                                    set_override: |target: &mut $ty,
                                                   value: ::std::boxed::Box<dyn ::std::any::Any>|
                                     -> ::std::result::Result<(), ::std::boxed::Box<dyn ::std::any::Any>> {
                                        target.$field = *value.downcast::<$fty>()?;
                                        Ok(())
                                    },
                                },
                            )*
                        ])
                    })
                }
            }
        )*
    };
}

type MapFunction = dyn Fn(&str) -> Option<String>;

/// Materialization options.
#[derive(Default)]
pub struct Materializer {
    strict: bool,
    map: Option<Box<MapFunction>>,
    hook: Option<Box<TranslationHook>>,
}

impl Materializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match field names to columns case-sensitively.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Map column names to field names with `f` instead of field attributes.
    pub fn map_with(mut self, f: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.map = Some(Box::new(f));
        self
    }

    pub fn translate(mut self, hook: impl Fn(&FieldInfo, &Value) -> Translation + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Materialize every row of `table` into a `T`.
    pub fn materialize<T: Entity>(&self, table: &DataTable) -> DbResult<Vec<T>> {
        if table.columns().is_empty() {
            return Ok(Vec::new());
        }
        let plan = self.plan(T::mapping(), table)?;

        let mut items = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            let mut item = T::default();
            for (index, field) in &plan {
                let value = row.get(*index).cloned().unwrap_or_default();
                self.assign(&mut item, field, value)?;
            }
            items.push(item);
        }

        debug!(
            entity = type_name::<T>(),
            rows = items.len(),
            fields = plan.len(),
            "Materialized rows"
        );
        Ok(items)
    }

    /// Pair each column index with the field it feeds.
    fn plan<'m, T>(
        &self,
        mapping: &'m Mapping<T>,
        table: &DataTable,
    ) -> DbResult<Vec<(usize, &'m FieldDescriptor<T>)>> {
        let columns = table.columns();

        if let Some(map) = &self.map {
            return Ok(columns
                .iter()
                .enumerate()
                .filter_map(|(index, column)| {
                    let field_name = map(&column.name).filter(|n| !n.is_empty())?;
                    mapping.field(&field_name).map(|field| (index, field))
                })
                .collect());
        }

        let mut plan = Vec::new();
        for field in mapping.fields() {
            let index = match field.info.source {
                Some(source) => Some(
                    columns
                        .iter()
                        .position(|c| names_equal(&c.name, source))
                        .ok_or_else(|| {
                            DbError::configuration(format!(
                                "Column '{source}' mapped to field '{}' is not in the result",
                                field.info.name
                            ))
                        })?,
                ),
                None if self.strict => columns.iter().position(|c| c.name == field.info.name),
                None => columns
                    .iter()
                    .position(|c| names_equal(&c.name, field.info.name)),
            };
            if let Some(index) = index {
                plan.push((index, field));
            }
        }
        Ok(plan)
    }

    fn assign<T>(&self, item: &mut T, field: &FieldDescriptor<T>, value: Value) -> DbResult<()> {
        let translation = match &self.hook {
            Some(hook) => hook(&field.info, &value),
            None => Translation::Default,
        };

        match translation {
            Translation::Default => {
                (field.set)(item, value).map_err(|e| e.for_field(field.info.name))?;
            }
            Translation::Override(replacement) => {
                (field.set_override)(item, replacement).map_err(|_| {
                    ConversionError::new(
                        value.kind(),
                        field.info.type_name,
                        Some("translation returned a value of a different type".to_string()),
                    )
                    .for_field(field.info.name)
                })?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Materializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materializer")
            .field("strict", &self.strict)
            .field("map", &self.map.is_some())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        string_value: String,
        int_value: i32,
        note: Option<String>,
    }

    crate::entity! {
        Sample {
            string_value: String => "STR",
            int_value: i32 => "INT",
            note: Option<String>,
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Plain {
        name: String,
        count: Option<i64>,
    }

    crate::entity! {
        Plain {
            name: String,
            count: Option<i64>,
        }
    }

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> DataTable {
        DataTable::new(
            columns.iter().map(|c| Column::new(*c, "TEXT", true)).collect(),
            rows,
        )
    }

    #[test]
    fn test_mapping_descriptor() {
        let mapping = Sample::mapping();
        assert_eq!(mapping.fields().len(), 3);
        let field = mapping.field("int_value").unwrap();
        assert_eq!(field.info.source, Some("INT"));
        assert_eq!(field.info.kind, ValueKind::Int);
        assert!(!field.info.nullable);
        assert!(mapping.field("note").unwrap().info.nullable);
        assert!(mapping.field("INT_VALUE").is_none());
    }

    #[test]
    fn test_source_columns_take_precedence() {
        let t = table(&["str", "int", "string_value"], vec![vec![
            Value::from("x"),
            Value::Int(5),
            Value::from("ignored"),
        ]]);
        let items: Vec<Sample> = Materializer::new().materialize(&t).unwrap();
        assert_eq!(items, vec![Sample {
            string_value: "x".into(),
            int_value: 5,
            note: None,
        }]);
    }

    #[test]
    fn test_missing_source_column_is_configuration_error() {
        let t = table(&["STR"], vec![vec![Value::from("x")]]);
        let err = Materializer::new().materialize::<Sample>(&t).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_name_matching_and_strictness() {
        let t = table(&["NAME", "Count", "extra"], vec![vec![
            Value::from("a"),
            Value::Int(2),
            Value::Int(9),
        ]]);
        let items: Vec<Plain> = Materializer::new().materialize(&t).unwrap();
        assert_eq!(items[0], Plain {
            name: "a".into(),
            count: Some(2),
        });

        let items: Vec<Plain> = Materializer::new().strict(true).materialize(&t).unwrap();
        assert_eq!(items[0], Plain::default());
    }

    #[test]
    fn test_null_handling() {
        let t = table(&["name", "count"], vec![vec![Value::from("a"), Value::Null]]);
        let items: Vec<Plain> = Materializer::new().materialize(&t).unwrap();
        assert_eq!(items[0].count, None);

        let t = table(&["name"], vec![vec![Value::Null]]);
        let err = Materializer::new().materialize::<Plain>(&t).unwrap_err();
        match err {
            DbError::Conversion(e) => assert_eq!(e.field.as_deref(), Some("name")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_map_function_skips_unknown() {
        let t = table(&["c1", "c2", "c3"], vec![vec![
            Value::from("a"),
            Value::Int(3),
            Value::Int(4),
        ]]);
        let materializer = Materializer::new().map_with(|column| match column {
            "c1" => Some("name".to_string()),
            "c2" => Some("no_such_field".to_string()),
            "c3" => Some(String::new()),
            _ => None,
        });
        let items: Vec<Plain> = materializer.materialize(&t).unwrap();
        assert_eq!(items[0], Plain {
            name: "a".into(),
            count: None,
        });
    }

    #[test]
    fn test_translation_hook() {
        let t = table(&["name", "count"], vec![vec![Value::from("a"), Value::from("n/a")]]);
        let materializer = Materializer::new().translate(|field, value| {
            if field.name == "count" && value == &Value::from("n/a") {
                Translation::value(Some(-1i64))
            } else {
                Translation::Default
            }
        });
        let items: Vec<Plain> = materializer.materialize(&t).unwrap();
        assert_eq!(items[0], Plain {
            name: "a".into(),
            count: Some(-1),
        });

        let wrong = Materializer::new().translate(|_, _| Translation::value(1u8));
        let err = wrong.materialize::<Plain>(&t).unwrap_err();
        assert!(err.is_conversion());
        assert!(err.to_string().contains("different type"));
    }

    #[test]
    fn test_result_without_columns() {
        let items: Vec<Sample> = Materializer::new()
            .materialize(&DataTable::empty())
            .unwrap();
        assert!(items.is_empty());
    }
}
