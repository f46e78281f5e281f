//! Forward-only cursor over buffered result sets.

use crate::db::SharedConnection;
use crate::models::{Column, DataRow, DataTable, Value};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Options that shape what a reader exposes and how it cleans up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandBehavior {
    #[default]
    Default,
    /// Close the connection when the reader is closed, unless a transaction
    /// is still running on it.
    CloseConnection,
    /// Only the first row of the first result set.
    SingleRow,
    /// Only the first result set.
    SingleResult,
}

/// A cursor over the result sets of one execution.
///
/// Rows are already buffered when the reader is created; `read` advances
/// through the current result set and `next_result` moves to the next one.
/// Dropping the reader closes it.
pub struct DataReader {
    pending: VecDeque<DataTable>,
    current: Option<DataTable>,
    /// Index of the current row; `None` before the first `read`.
    position: Option<usize>,
    behavior: CommandBehavior,
    connection: Option<SharedConnection>,
    closed: bool,
}

impl DataReader {
    pub(crate) fn new(
        tables: Vec<DataTable>,
        behavior: CommandBehavior,
        connection: Option<SharedConnection>,
    ) -> Self {
        let mut pending: VecDeque<DataTable> = tables.into();
        match behavior {
            CommandBehavior::SingleResult => pending.truncate(1),
            CommandBehavior::SingleRow => {
                pending.truncate(1);
                if let Some(first) = pending.pop_front() {
                    let name = first.name.clone();
                    let columns = first.columns().to_vec();
                    let rows = first
                        .into_rows()
                        .into_iter()
                        .take(1)
                        .map(|row| row.values().to_vec())
                        .collect();
                    let mut table = DataTable::new(columns, rows);
                    table.name = name;
                    pending.push_back(table);
                }
            }
            CommandBehavior::Default | CommandBehavior::CloseConnection => {}
        }

        let current = pending.pop_front();
        Self {
            pending,
            current,
            position: None,
            behavior,
            connection: connection.filter(|_| behavior == CommandBehavior::CloseConnection),
            closed: false,
        }
    }

    pub fn behavior(&self) -> CommandBehavior {
        self.behavior
    }

    /// Advance to the next row of the current result set.
    pub fn read(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let Some(table) = &self.current else {
            return false;
        };
        let next = self.position.map_or(0, |p| p + 1);
        if next < table.row_count() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(table.row_count());
            false
        }
    }

    /// Move to the next result set. Returns `false` when there is none.
    pub fn next_result(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.pending.pop_front();
        self.position = None;
        self.current.is_some()
    }

    pub fn current_row(&self) -> Option<&DataRow> {
        let table = self.current.as_ref()?;
        table.rows().get(self.position?)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.current_row()?.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.current_row()?.get_by_name(name)
    }

    pub fn columns(&self) -> &[Column] {
        self.current.as_ref().map_or(&[], |t| t.columns())
    }

    pub fn field_count(&self) -> usize {
        self.columns().len()
    }

    pub fn has_rows(&self) -> bool {
        self.current.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the reader. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        self.pending.clear();

        if let Some(connection) = self.connection.take() {
            if connection.in_transaction() {
                debug!(
                    connection = connection.id(),
                    "Reader closed, connection kept open for active transaction"
                );
            } else if let Err(e) = connection.close() {
                warn!(error = %e, "Failed to close connection with reader");
            } else {
                debug!(connection = connection.id(), "Reader closed its connection");
            }
        }
    }
}

impl Iterator for DataReader {
    type Item = DataRow;

    fn next(&mut self) -> Option<DataRow> {
        if self.read() {
            self.current_row().cloned()
        } else {
            None
        }
    }
}

impl Drop for DataReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("behavior", &self.behavior)
            .field("position", &self.position)
            .field("pending", &self.pending.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Connection, IsolationLevel, MockConnection};

    fn numbers(name: &str, n: i64) -> DataTable {
        DataTable::new(
            vec![Column::new(name, "INT", false)],
            (1..=n).map(|i| vec![Value::Int(i)]).collect(),
        )
    }

    #[test]
    fn test_read_and_next_result() {
        let mut reader = DataReader::new(
            vec![numbers("a", 2), numbers("b", 1)],
            CommandBehavior::Default,
            None,
        );
        assert_eq!(reader.field_count(), 1);
        assert!(reader.current_row().is_none());
        assert!(reader.read());
        assert_eq!(reader.get(0), Some(&Value::Int(1)));
        assert!(reader.read());
        assert_eq!(reader.get_by_name("A"), Some(&Value::Int(2)));
        assert!(!reader.read());

        assert!(reader.next_result());
        assert_eq!(reader.columns()[0].name, "b");
        assert_eq!(reader.by_ref().count(), 1);
        assert!(!reader.next_result());
    }

    #[test]
    fn test_single_row_and_single_result() {
        let reader = DataReader::new(
            vec![numbers("a", 3), numbers("b", 3)],
            CommandBehavior::SingleRow,
            None,
        );
        assert_eq!(reader.count(), 1);

        let mut reader = DataReader::new(
            vec![numbers("a", 3), numbers("b", 3)],
            CommandBehavior::SingleResult,
            None,
        );
        assert_eq!(reader.by_ref().count(), 3);
        assert!(!reader.next_result());
    }

    #[test]
    fn test_close_connection_behavior() {
        let mock = MockConnection::new();
        let handle = mock.handle();
        let conn = SharedConnection::new(Box::new(mock));
        conn.open().unwrap();

        let reader = DataReader::new(vec![], CommandBehavior::CloseConnection, Some(conn.clone()));
        drop(reader);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_close_connection_spares_transaction() {
        let mock = MockConnection::new();
        let handle = mock.handle();
        let conn = SharedConnection::new(Box::new(mock));
        conn.begin_transaction(IsolationLevel::Serializable).unwrap();

        let mut reader =
            DataReader::new(vec![], CommandBehavior::CloseConnection, Some(conn.clone()));
        reader.close();
        assert!(reader.is_closed());
        assert!(handle.is_open());
        assert!(handle.in_transaction());
    }

    #[test]
    fn test_default_behavior_leaves_connection_open() {
        let mock = MockConnection::new();
        let handle = mock.handle();
        let conn = SharedConnection::new(Box::new(mock));
        conn.open().unwrap();

        drop(DataReader::new(
            vec![numbers("a", 1)],
            CommandBehavior::Default,
            Some(conn.clone()),
        ));
        assert!(handle.is_open());
    }
}
