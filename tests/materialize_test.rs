//! Integration tests for row materialization over SQLite.

use db_command::command::Command;
use db_command::db::{DbConnection, SharedConnection};
use db_command::mapping::{Materializer, Translation};
use db_command::{DbError, entity};

fn memory() -> SharedConnection {
    SharedConnection::new(Box::new(DbConnection::new("sqlite::memory:").unwrap()))
}

#[derive(Debug, Default, PartialEq)]
struct Vanilla {
    string_value: String,
    int_value: i32,
}

#[derive(Debug, Default, PartialEq)]
struct Nullable {
    string_value: Option<String>,
    int_value: Option<i32>,
}

#[derive(Debug, Default, PartialEq)]
struct Mapped {
    string_value: String,
    int_value: i64,
}

#[derive(Debug, Default, PartialEq)]
struct Order {
    id: i64,
    customer: String,
    amount: f64,
    paid: bool,
    note: Option<String>,
}

entity! {
    Vanilla {
        string_value: String,
        int_value: i32,
    }

    Nullable {
        string_value: Option<String>,
        int_value: Option<i32>,
    }

    Mapped {
        string_value: String => "STR",
        int_value: i64 => "INT",
    }

    Order {
        id: i64,
        customer: String,
        amount: f64,
        paid: bool,
        note: Option<String>,
    }
}

#[test]
fn test_single_row_projection_ignores_case() {
    let mut cmd = Command::text(
        "SELECT 'x' AS STRING_VALUE, 5 AS Int_Value, 'unused' AS other",
        memory(),
    );
    let items: Vec<Vanilla> = cmd.get_objects().unwrap();
    assert_eq!(items, vec![Vanilla {
        string_value: "x".to_string(),
        int_value: 5,
    }]);
}

#[test]
fn test_all_null_row_into_nullable_type() {
    let mut cmd = Command::text("SELECT NULL AS string_value, NULL AS int_value", memory());
    let item: Option<Nullable> = cmd.get_object().unwrap();
    assert_eq!(item, Some(Nullable::default()));
}

#[test]
fn test_null_into_non_nullable_is_conversion_error() {
    let mut cmd = Command::text("SELECT NULL AS string_value, 1 AS int_value", memory());
    let err = cmd.get_objects::<Vanilla>().unwrap_err();
    match err {
        DbError::Conversion(e) => assert_eq!(e.field.as_deref(), Some("string_value")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_source_column_overrides() {
    let mut cmd = Command::text("SELECT 'x' AS STR, 5 AS INT", memory());
    let items: Vec<Mapped> = cmd.get_objects().unwrap();
    assert_eq!(items, vec![Mapped {
        string_value: "x".to_string(),
        int_value: 5,
    }]);
}

#[test]
fn test_map_function_leaves_unknown_fields_untouched() {
    let mut cmd = Command::text("SELECT 'x' AS a, 5 AS b, 7 AS c", memory());
    let materializer = Materializer::new().map_with(|column| match column {
        "a" => Some("string_value".to_string()),
        "b" => Some("no_such_field".to_string()),
        _ => None,
    });
    let items: Vec<Vanilla> = cmd.get_objects_with(&materializer).unwrap();
    assert_eq!(items, vec![Vanilla {
        string_value: "x".to_string(),
        int_value: 0,
    }]);
}

#[test]
fn test_strict_matching_is_case_sensitive() {
    let mut cmd = Command::text("SELECT 'x' AS STRING_VALUE, 5 AS int_value", memory());
    let items: Vec<Vanilla> = cmd
        .get_objects_with(&Materializer::new().strict(true))
        .unwrap();
    assert_eq!(items, vec![Vanilla {
        string_value: String::new(),
        int_value: 5,
    }]);
}

#[test]
fn test_table_rows_with_parameters_and_hook() {
    let conn = memory();
    let mut setup = Command::text(
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT, amount REAL, paid INTEGER, note TEXT);
         INSERT INTO orders VALUES (1, 'acme', 10.5, 1, NULL);
         INSERT INTO orders VALUES (2, 'globex', 20, 0, 'rush');
         INSERT INTO orders VALUES (3, 'acme', 7.25, 0, 'n/a');",
        conn.clone(),
    );
    setup.execute().unwrap();

    let mut cmd = Command::text(
        "SELECT id, customer, amount, paid, note FROM orders WHERE customer = @customer ORDER BY id",
        conn,
    );
    cmd.set_parameter("@customer", "acme");

    let materializer = Materializer::new().translate(|field, value| {
        if field.name == "note" && value.to_string() == "n/a" {
            Translation::value(None::<String>)
        } else {
            Translation::Default
        }
    });
    let orders: Vec<Order> = cmd.get_objects_with(&materializer).unwrap();

    assert_eq!(orders, vec![
        Order {
            id: 1,
            customer: "acme".into(),
            amount: 10.5,
            paid: true,
            note: None,
        },
        Order {
            id: 3,
            customer: "acme".into(),
            amount: 7.25,
            paid: false,
            note: None,
        },
    ]);
}

#[test]
fn test_empty_result_materializes_nothing() {
    let conn = memory();
    Command::text("CREATE TABLE t (string_value TEXT, int_value INTEGER)", conn.clone())
        .execute()
        .unwrap();
    let mut cmd = Command::text("SELECT string_value, int_value FROM t", conn);
    assert!(cmd.get_objects::<Vanilla>().unwrap().is_empty());
    assert!(cmd.get_object::<Vanilla>().unwrap().is_none());
}
