//! Stored procedure round trips against live servers.
//!
//! These run only when `TEST_POSTGRES_URL` or `TEST_MYSQL_URL` points at a
//! scratch database; otherwise they return early.

use db_command::config::DataSettings;
use db_command::entity;
use db_command::models::Value;
use rust_decimal::Decimal;

fn settings_from_env(var: &str) -> Option<DataSettings> {
    match std::env::var(var) {
        Ok(url) if !url.is_empty() => Some(DataSettings::new(url)),
        _ => {
            eprintln!("{var} not set, skipping");
            None
        }
    }
}

fn run_all(settings: &DataSettings, statements: &[&str]) {
    for sql in statements {
        settings.text(*sql).unwrap().execute().unwrap();
    }
}

#[test]
fn test_postgres_procedure_outputs() {
    let Some(settings) = settings_from_env("TEST_POSTGRES_URL") else {
        return;
    };
    run_all(&settings, &[
        "CREATE OR REPLACE PROCEDURE dbcmd_add(a bigint, b bigint, INOUT total bigint) \
         LANGUAGE plpgsql AS $$ BEGIN total := a + b; END $$",
    ]);

    let mut cmd = settings.procedure("dbcmd_add").unwrap();
    cmd.set_parameter("a", 2);
    cmd.set_parameter("@B", 3);
    cmd.set_parameter("total", 0);
    cmd.execute().unwrap();

    assert_eq!(cmd.derived_parameters().len(), 3);
    assert_eq!(cmd.parameter("total"), Some(&Value::Int(5)));

    run_all(&settings, &["DROP PROCEDURE IF EXISTS dbcmd_add(bigint, bigint, bigint)"]);
}

#[test]
fn test_postgres_procedure_with_narrow_and_numeric_parameters() {
    let Some(settings) = settings_from_env("TEST_POSTGRES_URL") else {
        return;
    };
    run_all(&settings, &[
        "CREATE OR REPLACE PROCEDURE dbcmd_scale(a integer, b smallint, rate numeric, \
         INOUT total integer, INOUT scaled numeric) \
         LANGUAGE plpgsql AS $$ BEGIN total := a + b; scaled := total * rate; END $$",
    ]);

    let mut cmd = settings.procedure("dbcmd_scale").unwrap();
    cmd.set_parameter("a", 2);
    cmd.set_parameter("b", 3);
    cmd.set_parameter("rate", Value::Decimal("1.10".parse().unwrap()));
    cmd.set_parameter("total", 0);
    cmd.set_parameter("scaled", Value::Null);
    cmd.execute().unwrap();

    assert_eq!(cmd.parameter("total"), Some(&Value::Int(5)));
    assert_eq!(
        cmd.parameter("scaled"),
        Some(&Value::Decimal("5.50".parse().unwrap()))
    );

    run_all(&settings, &[
        "DROP PROCEDURE IF EXISTS dbcmd_scale(integer, smallint, numeric, integer, numeric)",
    ]);
}

#[derive(Debug, Default, PartialEq)]
struct Invoice {
    id: i32,
    amount: Decimal,
}

entity! {
    Invoice {
        id: i32,
        amount: Decimal,
    }
}

#[test]
fn test_postgres_numeric_survives_bound_queries() {
    let Some(settings) = settings_from_env("TEST_POSTGRES_URL") else {
        return;
    };
    let exact: Decimal = "12345678901234567.89".parse().unwrap();

    // Bound parameters make the server answer in binary format.
    let mut bound = settings
        .text("SELECT 12345678901234567.89::numeric AS amount WHERE 1 = @one")
        .unwrap();
    bound.set_parameter("@one", 1);
    assert_eq!(bound.execute_scalar().unwrap(), Value::Decimal(exact));

    let mut plain = settings
        .text("SELECT 12345678901234567.89::numeric AS amount")
        .unwrap();
    assert_eq!(plain.execute_scalar().unwrap(), Value::Decimal(exact));

    let mut rows = settings
        .text("SELECT 7 AS id, @amount::numeric(20,2) AS amount")
        .unwrap();
    rows.set_parameter("@amount", Value::Decimal(exact));
    let invoices: Vec<Invoice> = rows.get_objects().unwrap();
    assert_eq!(invoices, vec![Invoice { id: 7, amount: exact }]);
}

#[test]
fn test_postgres_unknown_procedure_fails_with_context() {
    let Some(settings) = settings_from_env("TEST_POSTGRES_URL") else {
        return;
    };
    let mut cmd = settings.procedure("dbcmd_missing_procedure").unwrap();
    let err = cmd.execute().unwrap_err();
    assert!(err.is_execution());
    assert!(err.to_string().contains("dbcmd_missing_procedure"));
    assert!(err.context().is_some_and(|c| c.starts_with("Query:\ndbcmd_missing_procedure")));
}

#[test]
fn test_mysql_procedure_outputs_and_result_set() {
    let Some(settings) = settings_from_env("TEST_MYSQL_URL") else {
        return;
    };
    run_all(&settings, &[
        "DROP PROCEDURE IF EXISTS dbcmd_add",
        "CREATE PROCEDURE dbcmd_add(IN a BIGINT, IN b BIGINT, INOUT total BIGINT, OUT label VARCHAR(20)) \
         BEGIN SET total = a + b; SET label = 'sum'; SELECT a AS lhs, b AS rhs; END",
    ]);

    let mut cmd = settings.procedure("dbcmd_add").unwrap();
    cmd.set_parameter("a", 4);
    cmd.set_parameter("b", 6);
    cmd.set_parameter("total", 0);

    let rows = cmd.get_rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_by_name("lhs"), Some(&Value::Int(4)));
    assert_eq!(cmd.parameter("total"), Some(&Value::Int(10)));
    assert_eq!(cmd.parameter("label"), Some(&Value::from("sum")));

    run_all(&settings, &["DROP PROCEDURE IF EXISTS dbcmd_add"]);
}

#[test]
fn test_mysql_decimal_is_exact() {
    let Some(settings) = settings_from_env("TEST_MYSQL_URL") else {
        return;
    };
    let mut cmd = settings
        .text("SELECT CAST(@amount AS DECIMAL(20,2)) AS amount")
        .unwrap();
    cmd.set_parameter("@amount", "12345678901234567.89");
    assert_eq!(
        cmd.execute_scalar().unwrap(),
        Value::Decimal("12345678901234567.89".parse().unwrap())
    );
}
