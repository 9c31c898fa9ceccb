//! CLI integration tests for sql-dump.
//!
//! These tests verify argument parsing, settings merging and exit codes
//! against small SQLite databases.

use assert_cmd::Command;
use flate2::read::GzDecoder;
use predicates::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Executor};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a command for the sql-dump binary.
fn cmd() -> Command {
    let mut command = Command::cargo_bin("sql-dump").unwrap();
    command.env_remove("SQL_DUMP_USER").env_remove("SQL_DUMP_PASSWORD");
    command
}

/// Create `shop.db` holding one table with two rows.
fn shop_database(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("shop.db");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let mut connection = SqliteConnection::connect_with(&options).await.unwrap();
        (&mut connection)
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        (&mut connection)
            .execute("INSERT INTO t VALUES (1, 'x'), (2, 'y')")
            .await
            .unwrap();
        connection.close().await.unwrap();
    });
    path
}

fn dsn(path: &Path) -> String {
    format!("sqlite:host=localhost;dbname={}", path.display())
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_lists_options() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dsn"))
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--settings-file"))
        .stdout(predicate::str::contains("--set"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sql-dump"));
}

#[test]
fn test_missing_dsn_fails() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dsn"));
}

// =============================================================================
// Dump Tests
// =============================================================================

#[test]
fn test_dump_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let database = shop_database(&dir);

    cmd()
        .args(["--dsn", &dsn(&database)])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE t"))
        .stdout(predicate::str::contains("INSERT INTO \"t\" VALUES (1,'x'),(2,'y');"));
}

#[test]
fn test_set_overrides_settings_json() {
    let dir = tempfile::tempdir().unwrap();
    let database = shop_database(&dir);

    let output = cmd()
        .args(["--dsn", &dsn(&database)])
        .args(["--settings", r#"{"extended-insert": true, "skip-comments": true}"#])
        .args(["--set", "extended-insert=false"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert_eq!(text.matches("INSERT INTO").count(), 2, "{text}");
    assert!(!text.contains("--"));
}

#[test]
fn test_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let database = shop_database(&dir);
    let settings = dir.path().join("settings.json");
    std::fs::write(&settings, r#"{"no-data": true}"#).unwrap();

    cmd()
        .args(["--dsn", &dsn(&database)])
        .arg("--settings-file")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE t"))
        .stdout(predicate::str::contains("INSERT INTO").not());
}

#[test]
fn test_gzip_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let database = shop_database(&dir);
    let output = dir.path().join("shop.sql.gz");

    cmd()
        .args(["--dsn", &dsn(&database)])
        .args(["--set", "compress=gzip"])
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("does not end with").not());

    let mut text = String::new();
    GzDecoder::new(std::fs::File::open(&output).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    assert!(text.contains("INSERT INTO \"t\" VALUES (1,'x'),(2,'y');"));
}

#[test]
fn test_warns_when_compressed_output_lacks_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let database = shop_database(&dir);
    let output = dir.path().join("shop.sql");

    cmd()
        .args(["--dsn", &dsn(&database)])
        .args(["--set", "compress=bzip2"])
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("Output file name does not end with .bz2"));
    assert!(output.exists());
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_unknown_setting_fails() {
    let dir = tempfile::tempdir().unwrap();
    let database = shop_database(&dir);

    cmd()
        .args(["--dsn", &dsn(&database)])
        .args(["--set", "no-such-option=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-option"));
}

#[test]
fn test_invalid_settings_json_fails() {
    cmd()
        .args(["--dsn", "sqlite:host=localhost;dbname=x.db"])
        .args(["--settings", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--settings is not valid JSON"));
}

#[test]
fn test_unsupported_driver_fails() {
    cmd()
        .args(["--dsn", "oracle:host=localhost;dbname=shop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported driver"));
}

#[test]
fn test_missing_include_table_fails() {
    let dir = tempfile::tempdir().unwrap();
    let database = shop_database(&dir);

    cmd()
        .args(["--dsn", &dsn(&database)])
        .args(["--settings", r#"{"include-tables": ["t", "missing"]}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Table (missing) not found in database"));
}
