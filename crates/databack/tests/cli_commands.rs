use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn databack_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_databack"))
}

fn run_cli(home: &Path, args: &[&str]) -> Output {
    Command::new(databack_bin())
        .args(args)
        .env("DATABACK_HOME", home)
        .env_remove("DATABACK_DB_URL")
        .env_remove("DATABACK_USER")
        .env_remove("DATABACK_PASSWORD")
        .env_remove("DATABACK_BACKUP_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute databack CLI")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Nothing listens on port 1; connecting fails immediately.
const UNREACHABLE_DB: &str = "postgres://127.0.0.1:1/databack";

/// Two recorded versions: `users` from v1 with one delta, `orders` added in v2.
fn seed_index(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let index = serde_json::json!({
        "path": dir.display().to_string(),
        "constraints": {
            "path": "constraints",
            "versions": ["add_constraints_v1.sql", "add_constraints_v2.sql"]
        },
        "tableSchema": {
            "path": "tableSchema",
            "versions": ["create_tables_v1.sql", "create_tables_v2.sql"]
        },
        "objects": {
            "path": "objects",
            "tables": {
                "users": {
                    "path": "users",
                    "base": "users_v1.json",
                    "introduced": 1,
                    "incremental": ["users_incremental_v2.json"],
                    "current": "users_current.json"
                },
                "orders": {
                    "path": "orders",
                    "base": "orders_v2.json",
                    "introduced": 2,
                    "incremental": [],
                    "current": "orders_current.json"
                }
            }
        }
    });
    fs::write(
        dir.join("metadata.json"),
        serde_json::to_string_pretty(&index).unwrap(),
    )
    .unwrap();
}

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    let output = run_cli(home.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["backup", "restore", "versions"] {
        assert!(text.contains(command), "missing {} in:\n{}", command, text);
    }
}

#[test]
fn versions_on_empty_dir() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("BackupData");
    let output = run_cli(
        home.path(),
        &["versions", "--backup-dir", backups.to_str().unwrap()],
    );
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    assert!(stdout(&output).contains("No backups recorded"));
    assert!(!backups.exists());
}

#[test]
fn versions_json_lists_tables_per_version() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("BackupData");
    seed_index(&backups);

    let output = run_cli(
        home.path(),
        &["versions", "--json", "--backup-dir", backups.to_str().unwrap()],
    );
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));

    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listing["latest"], "v2");
    let versions = listing["versions"].as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version"], "v1");
    assert_eq!(versions[0]["tables"], serde_json::json!(["users"]));
    assert_eq!(versions[1]["tables"], serde_json::json!(["orders", "users"]));
    assert!(versions[1]["schema"]
        .as_str()
        .unwrap()
        .ends_with("create_tables_v2.sql"));
}

#[test]
fn corrupt_index_is_a_serialization_error() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("BackupData");
    fs::create_dir_all(&backups).unwrap();
    fs::write(backups.join("metadata.json"), "{ not json").unwrap();

    let output = run_cli(
        home.path(),
        &["versions", "--backup-dir", backups.to_str().unwrap()],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("SerializationError"), "stderr:\n{}", stderr(&output));
}

#[test]
fn restore_without_backups_fails_before_connecting() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("missing");
    let output = run_cli(
        home.path(),
        &[
            "restore",
            "--db-url",
            UNREACHABLE_DB,
            "--backup-dir",
            backups.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("VersionNotFoundError"), "stderr:\n{}", err);
    assert!(!err.contains("ConnectivityError"));
    assert!(!backups.exists());
}

#[test]
fn restore_rejects_malformed_version() {
    let home = TempDir::new().unwrap();
    let output = run_cli(
        home.path(),
        &["restore", "--db-url", UNREACHABLE_DB, "--version", "3"],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("expected v<N>"), "stderr:\n{}", stderr(&output));
}

#[test]
fn restore_unknown_version_names_latest() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("BackupData");
    seed_index(&backups);

    let output = run_cli(
        home.path(),
        &[
            "restore",
            "--db-url",
            UNREACHABLE_DB,
            "--version",
            "v7",
            "--backup-dir",
            backups.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("VersionNotFoundError"), "stderr:\n{}", err);
    assert!(err.contains("latest is v2"));
}

#[test]
fn backup_reports_connectivity_failure_without_committing() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("BackupData");
    let output = run_cli(
        home.path(),
        &[
            "backup",
            "--db-url",
            UNREACHABLE_DB,
            "--user",
            "nobody",
            "--password",
            "hunter2",
            "--backup-dir",
            backups.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("ConnectivityError"), "stderr:\n{}", err);
    assert!(!err.contains("hunter2"));
    assert!(!backups.join("metadata.json").exists());
}

#[test]
fn backup_refuses_locked_directory() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("BackupData");
    let _held = databack_core::try_lock_backup_dir(&backups, "test").unwrap();

    let output = run_cli(
        home.path(),
        &[
            "backup",
            "--db-url",
            UNREACHABLE_DB,
            "--backup-dir",
            backups.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("LockedError"), "stderr:\n{}", stderr(&output));
}

#[test]
fn bad_db_url_is_rejected() {
    let home = TempDir::new().unwrap();
    let backups = home.path().join("BackupData");
    let output = run_cli(
        home.path(),
        &[
            "backup",
            "--db-url",
            "mysql://localhost/app",
            "--backup-dir",
            backups.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid database URL"));
    assert!(!backups.exists());
}
