//! Diagnostic context for failed commands.
//!
//! A driver failure is wrapped in a [`ContextualError`] carrying the command
//! text and every parameter as it was sent, or as supplied when the failure
//! came before binding. When no statement was captured at all, the secondary
//! failure is logged and a degraded context is used instead; the primary
//! error is never replaced.

use crate::config::LoggingCallback;
use crate::error::{
    ContextualError, DbError, DriverError, ErrorContext, ParameterSnapshot, render_error_chain,
};
use crate::models::Parameter;
use tracing::warn;

/// The statement a command was running when it failed.
#[derive(Debug, Clone, Copy)]
pub struct StatementSnapshot<'a> {
    pub text: &'a str,
    pub parameters: &'a [Parameter],
}

pub struct ErrorContextBuilder;

impl ErrorContextBuilder {
    /// Wrap `native` with the context of `statement`.
    pub fn build(
        native: DriverError,
        statement: Option<StatementSnapshot<'_>>,
        logger: Option<&LoggingCallback>,
    ) -> ContextualError {
        match Self::payload(statement) {
            Ok(payload) => {
                let context = payload.render();
                ContextualError::new(native, context, Some(payload))
            }
            Err(secondary) => {
                warn!(
                    error = %secondary,
                    native = %native,
                    "Failed to build error context"
                );
                if let Some(log) = logger {
                    log(&secondary);
                }
                let context = format!(
                    "Exception building context:\n{}",
                    render_error_chain(&secondary)
                );
                ContextualError::new(native, context, None)
            }
        }
    }

    fn payload(statement: Option<StatementSnapshot<'_>>) -> Result<ErrorContext, DbError> {
        let statement = statement.ok_or_else(|| {
            DbError::configuration("The command has no prepared statement to describe")
        })?;

        Ok(ErrorContext {
            command_text: statement.text.to_string(),
            parameters: statement
                .parameters
                .iter()
                .map(|p| ParameterSnapshot {
                    name: p.name.clone(),
                    value: p
                        .value
                        .as_ref()
                        .filter(|v| !v.is_null())
                        .map(ToString::to_string),
                })
                .collect(),
        })
    }
}
