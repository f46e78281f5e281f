//! Integration tests for multi-command transactions over a SQLite file.

use db_command::command::{Command, create_transaction};
use db_command::config::DataSettings;
use db_command::models::Value;
use tempfile::NamedTempFile;

/// A file-backed database with an empty `ledger` table.
fn setup() -> (NamedTempFile, DataSettings) {
    let temp_file = NamedTempFile::new().unwrap();
    let url = format!("sqlite:{}?mode=rwc", temp_file.path().to_str().unwrap());
    let settings = DataSettings::new(url);
    settings.initialize().unwrap();

    let mut create = settings
        .text("CREATE TABLE ledger (id INTEGER PRIMARY KEY, account TEXT NOT NULL, amount INTEGER NOT NULL)")
        .unwrap();
    create.execute().unwrap();
    (temp_file, settings)
}

fn ledger_count(settings: &DataSettings) -> i64 {
    settings
        .text("SELECT COUNT(*) FROM ledger")
        .unwrap()
        .execute_scalar_or(0i64)
        .unwrap()
}

fn insert(settings: &DataSettings, account: &str, amount: i64) -> Command {
    let mut cmd = settings
        .text("INSERT INTO ledger (account, amount) VALUES (@account, @amount)")
        .unwrap();
    cmd.set_parameter("@account", account);
    cmd.set_parameter("@amount", amount);
    cmd
}

#[test]
fn test_commands_share_connection_and_commit() {
    let (_file, settings) = setup();
    let mut debit = insert(&settings, "cash", -100);
    let mut credit = insert(&settings, "sales", 100);

    let tx = create_transaction(&mut [&mut debit, &mut credit]).unwrap();
    assert!(tx.is_active());
    let shared = debit.connection().unwrap();
    assert!(credit.connection().unwrap().same_as(shared));
    assert!(credit.transaction().unwrap().same_as(&tx));

    assert_eq!(debit.execute().unwrap(), 1);
    assert_eq!(credit.execute().unwrap(), 1);
    tx.commit().unwrap();
    assert!(!tx.is_active());

    drop(debit);
    drop(credit);
    assert_eq!(ledger_count(&settings), 2);
}

#[test]
fn test_rollback_undoes_every_command() {
    let (_file, settings) = setup();
    let mut a = insert(&settings, "a", 1);
    let mut b = insert(&settings, "b", 2);
    let mut c = insert(&settings, "c", 3);

    let tx = create_transaction(&mut [&mut a, &mut b, &mut c]).unwrap();
    a.execute().unwrap();
    b.execute().unwrap();
    c.execute().unwrap();
    c.rollback().unwrap();
    assert!(!tx.is_active());

    drop((a, b, c));
    assert_eq!(ledger_count(&settings), 0);
}

#[test]
fn test_failed_first_command_leaves_transaction_rollback_capable() {
    let (_file, settings) = setup();
    let mut broken = settings
        .text("INSERT INTO no_such_table (x) VALUES (@x)")
        .unwrap();
    broken.set_parameter("@x", 1);
    let mut valid = insert(&settings, "ok", 5);

    let tx = create_transaction(&mut [&mut broken, &mut valid]).unwrap();
    let err = broken.execute().unwrap_err();
    assert!(err.is_execution());
    assert!(err.context().unwrap().contains("no_such_table"));
    assert!(tx.is_active());

    valid.execute().unwrap();
    tx.rollback().unwrap();

    drop((broken, valid));
    assert_eq!(ledger_count(&settings), 0);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let (_file, settings) = setup();
    {
        let mut cmd = insert(&settings, "temp", 9);
        let _tx = cmd.begin_transaction().unwrap();
        cmd.execute().unwrap();
    }
    assert_eq!(ledger_count(&settings), 0);
}

#[test]
fn test_transaction_detaches_after_commit() {
    let (_file, settings) = setup();
    let mut cmd = insert(&settings, "x", 1);
    let tx = cmd.begin_transaction().unwrap();
    cmd.execute().unwrap();
    cmd.commit().unwrap();

    // Runs outside any transaction now.
    cmd.execute().unwrap();
    assert!(cmd.transaction().is_none());
    assert!(!tx.is_active());
    drop(cmd);
    assert_eq!(ledger_count(&settings), 2);
}

#[test]
fn test_scalar_from_file_database() {
    let (_file, settings) = setup();
    insert(&settings, "x", 40).execute().unwrap();
    insert(&settings, "y", 2).execute().unwrap();

    let mut total = settings.text("SELECT SUM(amount) FROM ledger").unwrap();
    assert_eq!(total.execute_scalar().unwrap(), Value::Int(42));
}
