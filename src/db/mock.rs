//! Scriptable in-memory driver.
//!
//! `MockConnection` implements [`Connection`] without a database: procedure
//! signatures are declared up front, responses are queued, and every call is
//! recorded so tests can assert on what the command engine asked for.
//! A [`MockHandle`] keeps access to that state after the connection has been
//! boxed and handed to a command.

use crate::db::connection::same_parameter;
use crate::db::driver::{
    CommandKind, Connection, Connector, DriverRequest, DriverResponse, ExecuteMode,
    IsolationLevel,
};
use crate::error::{DriverError, DriverResult};
use crate::models::{DataTable, Parameter, Value};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One queued reply to `execute`.
#[derive(Debug)]
pub enum MockResponse {
    Success {
        rows_affected: u64,
        results: Vec<DataTable>,
        /// Values written back into output parameters, by name.
        outputs: Vec<(String, Value)>,
    },
    Failure(DriverError),
}

impl MockResponse {
    pub fn rows(rows_affected: u64) -> Self {
        Self::Success {
            rows_affected,
            results: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn table(table: DataTable) -> Self {
        Self::Success {
            rows_affected: 0,
            results: vec![table],
            outputs: Vec::new(),
        }
    }

    pub fn tables(tables: Vec<DataTable>) -> Self {
        Self::Success {
            rows_affected: 0,
            results: tables,
            outputs: Vec::new(),
        }
    }

    /// Attach an output value. No effect on failures.
    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Success { outputs, .. } = &mut self {
            outputs.push((name.into(), value.into()));
        }
        self
    }
}

/// A request as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedRequest {
    pub text: String,
    pub kind: CommandKind,
    pub timeout: Duration,
    pub mode: ExecuteMode,
    pub parameters: Vec<Parameter>,
    pub in_transaction: bool,
}

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    in_transaction: bool,
    isolation: Option<IsolationLevel>,
    procedures: Vec<(String, Vec<Parameter>)>,
    responses: VecDeque<MockResponse>,
    derive_failure: Option<DriverError>,
    executed: Vec<ExecutedRequest>,
    events: Vec<String>,
    derive_calls: usize,
    server_version: String,
}

/// Shared view of a mock connection's state.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Rc<RefCell<MockState>>,
}

impl MockHandle {
    /// Declare a procedure and its parameters.
    pub fn define_procedure(&self, name: &str, parameters: Vec<Parameter>) {
        let mut state = self.state.borrow_mut();
        state
            .procedures
            .retain(|(n, _)| !crate::models::names_equal(n, name));
        state.procedures.push((name.to_string(), parameters));
    }

    pub fn push_response(&self, response: MockResponse) {
        self.state.borrow_mut().responses.push_back(response);
    }

    pub fn push_error(&self, error: DriverError) {
        self.push_response(MockResponse::Failure(error));
    }

    /// Make the next derivation fail.
    pub fn fail_next_derive(&self, error: DriverError) {
        self.state.borrow_mut().derive_failure = Some(error);
    }

    pub fn executed(&self) -> Vec<ExecutedRequest> {
        self.state.borrow().executed.clone()
    }

    /// Lifecycle events in order: `open`, `close`, `begin`, `commit`,
    /// `rollback`, `derive:<name>`, `execute:<text>`.
    pub fn events(&self) -> Vec<String> {
        self.state.borrow().events.clone()
    }

    pub fn derive_calls(&self) -> usize {
        self.state.borrow().derive_calls
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    pub fn in_transaction(&self) -> bool {
        self.state.borrow().in_transaction
    }

    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.state.borrow().isolation
    }
}

/// An in-memory connection driven by queued responses.
#[derive(Debug)]
pub struct MockConnection {
    state: Rc<RefCell<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                server_version: "mock 1.0".to_string(),
                ..MockState::default()
            })),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Rc::clone(&self.state),
        }
    }

    fn require_open(&self) -> DriverResult<()> {
        if self.state.borrow().open {
            Ok(())
        } else {
            Err(DriverError::connection("The connection is not open"))
        }
    }

    fn record(&self, event: impl Into<String>) {
        self.state.borrow_mut().events.push(event.into());
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for MockConnection {
    fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    fn open(&mut self) -> DriverResult<()> {
        if !self.state.borrow().open {
            self.state.borrow_mut().open = true;
            self.record("open");
        }
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        if state.open {
            state.open = false;
            state.in_transaction = false;
            state.events.push("close".to_string());
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state.borrow().in_transaction
    }

    fn begin_transaction(&mut self, isolation: IsolationLevel) -> DriverResult<()> {
        self.require_open()?;
        let mut state = self.state.borrow_mut();
        if state.in_transaction {
            return Err(DriverError::unsupported("nested transactions are not supported"));
        }
        state.in_transaction = true;
        state.isolation = Some(isolation);
        state.events.push("begin".to_string());
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.in_transaction {
            return Err(DriverError::database("No transaction is active", None));
        }
        state.in_transaction = false;
        state.events.push("commit".to_string());
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.in_transaction {
            return Err(DriverError::database("No transaction is active", None));
        }
        state.in_transaction = false;
        state.events.push("rollback".to_string());
        Ok(())
    }

    fn execute(&mut self, request: DriverRequest<'_>) -> DriverResult<DriverResponse> {
        self.require_open()?;
        let mut state = self.state.borrow_mut();
        let executed = ExecutedRequest {
            text: request.text.to_string(),
            kind: request.kind,
            timeout: request.timeout,
            mode: request.mode,
            parameters: request.parameters.to_vec(),
            in_transaction: state.in_transaction,
        };
        state.events.push(format!("execute:{}", request.text));
        state.executed.push(executed);

        match state.responses.pop_front() {
            None => Ok(DriverResponse::default()),
            Some(MockResponse::Failure(err)) => Err(err),
            Some(MockResponse::Success {
                rows_affected,
                results,
                outputs,
            }) => {
                for (name, value) in outputs {
                    if let Some(slot) = request
                        .parameters
                        .iter_mut()
                        .find(|p| p.direction.returns_output() && same_parameter(&p.name, &name))
                    {
                        slot.value = Some(value);
                    }
                }
                Ok(DriverResponse {
                    rows_affected,
                    results,
                })
            }
        }
    }

    fn derive_parameters(&mut self, procedure: &str) -> DriverResult<Vec<Parameter>> {
        self.require_open()?;
        let mut state = self.state.borrow_mut();
        state.derive_calls += 1;
        state.events.push(format!("derive:{procedure}"));
        if let Some(err) = state.derive_failure.take() {
            return Err(err);
        }
        state
            .procedures
            .iter()
            .find(|(name, _)| crate::models::names_equal(name, procedure))
            .map(|(_, params)| params.clone())
            .ok_or_else(|| {
                DriverError::database(
                    format!("Could not find stored procedure '{procedure}'."),
                    None,
                )
            })
    }

    fn server_version(&mut self) -> DriverResult<String> {
        self.require_open()?;
        Ok(self.state.borrow().server_version.clone())
    }
}

/// Creates [`MockConnection`]s with a fixed set of procedures.
#[derive(Debug, Default)]
pub struct MockConnector {
    procedures: Mutex<Vec<(String, Vec<Parameter>)>>,
    server_version: Mutex<Option<String>>,
    connects: AtomicUsize,
    refuse: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose connections cannot be created.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn with_procedure(self, name: &str, parameters: Vec<Parameter>) -> Self {
        self.procedures.lock().push((name.to_string(), parameters));
        self
    }

    pub fn with_server_version(self, version: &str) -> Self {
        *self.server_version.lock() = Some(version.to_string());
        self
    }

    /// Number of connections created so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, connection_string: &str) -> DriverResult<Box<dyn Connection>> {
        if self.refuse {
            return Err(DriverError::connection(format!(
                "connection refused: {connection_string}"
            )));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let connection = MockConnection::new();
        let handle = connection.handle();
        for (name, params) in self.procedures.lock().iter() {
            handle.define_procedure(name, params.clone());
        }
        if let Some(version) = self.server_version.lock().clone() {
            handle.state.borrow_mut().server_version = version;
        }
        Ok(Box::new(connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    #[test]
    fn test_queued_responses_and_outputs() {
        let mut conn = MockConnection::new();
        let handle = conn.handle();
        conn.open().unwrap();
        handle.push_response(MockResponse::rows(3).with_output("@total", 9));

        let mut params = vec![
            Parameter::input("@id", 1),
            Parameter::declared("total", Direction::Output, None),
        ];
        let response = conn
            .execute(DriverRequest {
                text: "usp_count",
                kind: CommandKind::StoredProcedure,
                timeout: Duration::from_secs(300),
                mode: ExecuteMode::NonQuery,
                parameters: &mut params,
            })
            .unwrap();

        assert_eq!(response.rows_affected, 3);
        assert_eq!(params[1].value, Some(Value::Int(9)));
        assert_eq!(handle.executed().len(), 1);
        assert_eq!(handle.events(), vec!["open", "execute:usp_count"]);
    }

    #[test]
    fn test_derive_unknown_procedure() {
        let mut conn = MockConnection::new();
        conn.open().unwrap();
        let err = conn.derive_parameters("usp_missing").unwrap_err();
        assert!(err.to_string().contains("usp_missing"));
    }

    #[test]
    fn test_transaction_events() {
        let mut conn = MockConnection::new();
        let handle = conn.handle();
        assert!(conn.begin_transaction(IsolationLevel::Serializable).is_err());
        conn.open().unwrap();
        conn.begin_transaction(IsolationLevel::Serializable).unwrap();
        assert!(handle.in_transaction());
        conn.rollback().unwrap();
        assert_eq!(handle.isolation(), Some(IsolationLevel::Serializable));
        assert_eq!(handle.events(), vec!["open", "begin", "rollback"]);
    }

    #[test]
    fn test_connector_counts_and_refuses() {
        let connector = MockConnector::new().with_server_version("9.9");
        let mut conn = connector.connect("mock://").unwrap();
        conn.open().unwrap();
        assert_eq!(conn.server_version().unwrap(), "9.9");
        assert_eq!(connector.connects(), 1);
        assert!(MockConnector::refusing().connect("mock://").is_err());
    }
}
