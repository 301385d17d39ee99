//! Command-line behavior of the `cartbackup` binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cartbackup(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cartbackup").unwrap();
    cmd.env("CARTBACKUP_DATA_DIR", data_dir.path())
        .env_remove("CARTBACKUP_PROFILE")
        .env("RUST_LOG", "off");
    cmd
}

fn seed_profile(data_dir: &TempDir, profile: &str, state: &str) {
    let dir = data_dir.path().join("profiles").join(profile);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("state.json"), state).unwrap();
}

#[test]
fn list_without_backups() {
    let data_dir = TempDir::new().unwrap();

    cartbackup(&data_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found."));
}

#[test]
fn create_then_list() {
    let data_dir = TempDir::new().unwrap();
    seed_profile(&data_dir, "studio", r#"{"version":1}"#);

    cartbackup(&data_dir)
        .args(["--profile", "studio", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: backup-"));

    cartbackup(&data_dir)
        .args(["--profile", "studio", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    assert!(data_dir
        .path()
        .join("backups")
        .join("studio")
        .join("backup-metadata.json")
        .exists());
}

#[test]
fn restore_latest_requires_force() {
    let data_dir = TempDir::new().unwrap();
    seed_profile(&data_dir, "default", r#"{"version":1}"#);
    let state = data_dir.path().join("profiles/default/state.json");

    cartbackup(&data_dir).arg("create").assert().success();
    fs::write(&state, r#"{"version":2}"#).unwrap();

    cartbackup(&data_dir)
        .args(["restore", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
    assert_eq!(fs::read_to_string(&state).unwrap(), r#"{"version":2}"#);

    cartbackup(&data_dir)
        .args(["restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore complete!"));
    assert_eq!(fs::read_to_string(&state).unwrap(), r#"{"version":1}"#);
}

#[test]
fn restore_unknown_backup_fails() {
    let data_dir = TempDir::new().unwrap();
    seed_profile(&data_dir, "default", "{}");

    cartbackup(&data_dir)
        .args(["restore", "backup-0000000000001-000001", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn settings_set_and_show() {
    let data_dir = TempDir::new().unwrap();

    cartbackup(&data_dir)
        .args(["settings", "set", "--max-count", "5", "--enabled", "false"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Keep at most:      5 backup(s)"));

    cartbackup(&data_dir)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));
}

#[test]
fn settings_reject_short_interval() {
    let data_dir = TempDir::new().unwrap();

    cartbackup(&data_dir)
        .args(["settings", "set", "--interval-secs", "0", "--enabled", "true"])
        .assert()
        .failure();
}

#[test]
fn invalid_profile_name_is_rejected() {
    let data_dir = TempDir::new().unwrap();

    cartbackup(&data_dir)
        .args(["--profile", "..", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid profile name"));
}

#[test]
fn config_shows_paths() {
    let data_dir = TempDir::new().unwrap();

    cartbackup(&data_dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup directory:"));
}

#[test]
fn source_override_does_not_create_profile_dir() {
    let data_dir = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("state.json"), r#"{"version":1}"#).unwrap();

    cartbackup(&data_dir)
        .args(["--profile", "studio", "--source"])
        .arg(source.path())
        .arg("create")
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 files,"));

    assert!(!data_dir.path().join("profiles").join("studio").exists());
    assert!(data_dir.path().join("backups").join("studio").is_dir());
}

#[test]
fn busy_profile_suggests_retry() {
    let data_dir = TempDir::new().unwrap();
    seed_profile(&data_dir, "default", "{}");
    fs::write(
        data_dir.path().join("config.json"),
        r#"{"lock_timeout_ms": 200}"#,
    )
    .unwrap();

    let backup_root = data_dir.path().join("backups").join("default");
    fs::create_dir_all(&backup_root).unwrap();
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis();
    fs::write(
        backup_root.join("backup-metadata.lock"),
        format!(r#"{{"holder":"other","acquiredAt":{},"pid":1}}"#, now_ms),
    )
    .unwrap();

    cartbackup(&data_dir)
        .arg("create")
        .assert()
        .failure()
        .stderr(predicate::str::contains("try again shortly"));
}
