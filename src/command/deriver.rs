//! Stored-procedure parameter derivation.

use crate::db::SharedConnection;
use crate::error::DriverResult;
use crate::models::Parameter;
use std::time::Instant;
use tracing::debug;

/// Reads a procedure's formal parameters from database metadata.
///
/// Nothing is cached; every call is a metadata round-trip.
pub struct ParameterDeriver;

impl ParameterDeriver {
    /// Derive the parameters of `procedure`, in declaration order.
    ///
    /// Opens the connection if it is closed.
    pub fn derive(procedure: &str, connection: &SharedConnection) -> DriverResult<Vec<Parameter>> {
        let start = Instant::now();
        let parameters = connection.with(|c| {
            if !c.is_open() {
                c.open()?;
            }
            c.derive_parameters(procedure)
        })?;

        debug!(
            command = %procedure,
            params = parameters.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Derived procedure parameters"
        );
        Ok(parameters)
    }
}
