//! Tabular result models.
//!
//! A `DataTable` is an ordered list of named columns and an ordered list of
//! rows; a `DataSet` is the batch of tables produced by one execution.
//! Column lookup by name is case-insensitive.

use crate::models::{NativeType, Value, names_equal};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
    pub nullable: bool,
}

impl Column {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }

    pub fn native_type(&self) -> NativeType {
        NativeType::from_type_name(&self.type_name)
    }
}

/// A row of a result table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl DataRow {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.column_index(name).and_then(|i| self.values.get(i))
    }

    /// Position of the first column with the given name (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| names_equal(&c.name, name))
    }

    /// Get the column metadata.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get the number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (column, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Column, &Value)> {
        self.columns.iter().zip(self.values.iter())
    }
}

impl Serialize for DataRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

/// A single tabular result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    columns: Arc<[Column]>,
    rows: Vec<DataRow>,
}

impl DataTable {
    /// Create a table from column metadata and raw row values.
    ///
    /// Rows shorter than the column list are padded with nulls; extra values
    /// are dropped.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let columns: Arc<[Column]> = columns.into();
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut values| {
                values.resize(width, Value::Null);
                DataRow::new(columns.clone(), values)
            })
            .collect();
        Self {
            name: None,
            columns,
            rows,
        }
    }

    /// Create an empty table (for executions without a result set).
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }

    /// Position of the first column with the given name (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| names_equal(&c.name, name))
    }

    /// Get the number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(0))
    }
}

/// The batch of tables produced by one execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DataSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub tables: Vec<DataTable>,
}

impl DataSet {
    pub fn new(name: Option<String>, tables: Vec<DataTable>) -> Self {
        Self { name, tables }
    }

    /// Remove and return the first table.
    pub fn take_first(&mut self) -> Option<DataTable> {
        if self.tables.is_empty() {
            None
        } else {
            Some(self.tables.remove(0))
        }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataTable {
        DataTable::new(
            vec![
                Column::new("STR", "TEXT", true),
                Column::new("Int", "INTEGER", true),
            ],
            vec![
                vec![Value::from("x"), Value::Int(5)],
                vec![Value::from("y")],
            ],
        )
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = sample();
        let row = &table.rows()[0];
        assert_eq!(row.get_by_name("str"), Some(&Value::from("x")));
        assert_eq!(row.get_by_name("INT"), Some(&Value::Int(5)));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = sample();
        assert_eq!(table.rows()[1].get(1), Some(&Value::Null));
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_scalar_and_empty() {
        assert_eq!(sample().scalar(), Some(&Value::from("x")));
        assert_eq!(DataTable::empty().scalar(), None);
        assert!(DataTable::empty().is_empty());
    }

    #[test]
    fn test_row_serializes_as_map() {
        let table = sample();
        let json = serde_json::to_value(&table.rows()[0]).unwrap();
        assert_eq!(json, serde_json::json!({"STR": "x", "Int": 5}));
    }

    #[test]
    fn test_take_first_table() {
        let mut ds = DataSet::new(None, vec![sample(), DataTable::empty()]);
        assert_eq!(ds.take_first().map(|t| t.row_count()), Some(2));
        assert_eq!(ds.table_count(), 1);
    }
}
