//! db-command - Main entry point.
//!
//! Runs one stored procedure or SQL command and prints its result sets,
//! output parameters and return value as JSON.

use clap::Parser;
use db_command::config::{Config, DataSettings, LoggingCallback};
use db_command::db::CommandKind;
use db_command::error::{DbError, render_error_chain};
use serde_json::{Map, json};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries the JSON result.
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let logger: LoggingCallback = Arc::new(|e: &(dyn std::error::Error + 'static)| {
        warn!(error = %e, "Diagnostic failure");
    });
    let settings = DataSettings::new(&config.database).with_logger(logger);

    let (kind, text) = config.command()?;
    let mut command = match kind {
        CommandKind::StoredProcedure => settings.procedure(text)?,
        CommandKind::Text => settings.text(text)?,
    };
    command.set_timeout(config.timeout_duration());
    for (name, value) in config.parameter_values() {
        command.set_parameter(name, value);
    }

    info!(command = %text, kind = ?kind, "Running command");
    let data_set = command.open_data_set(None)?;

    let mut outputs = Map::new();
    for p in command
        .derived_parameters()
        .iter()
        .filter(|p| p.direction.returns_output())
    {
        if let Some(value) = command.parameter(&p.name) {
            outputs.insert(p.name.clone(), serde_json::to_value(value)?);
        }
    }

    let output = json!({
        "tables": data_set.tables,
        "outputs": outputs,
        "return_value": command.return_value(),
        "execute_ms": command.execute_time().map(|d| d.as_millis() as u64),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{}", render_error_chain(&*e));
            if let Some(context) = e.downcast_ref::<DbError>().and_then(DbError::context) {
                eprintln!("{context}");
            }
            ExitCode::FAILURE
        }
    }
}
