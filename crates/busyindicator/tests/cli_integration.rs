//! Integration tests for the `busyindicator` binary.
//!
//! These tests exercise the CLI binary via `assert_cmd`. Everything runs
//! against a temporary config file and the console strip, so no network,
//! sign-in, or hardware is needed.

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn cli() -> assert_cmd::Command {
    cargo_bin_cmd!("busyindicator")
}

/// Write `contents` as config.toml in `dir` and return its path.
fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn cli_help_succeeds() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("busyindicator"));
}

#[test]
fn cli_version_prints_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_config_json_produces_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "app_id = \"abc\"\ncell_count = 8\n");

    let output = cli()
        .args(["--json", "config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value =
        serde_json::from_slice(&output).expect("config --json should produce valid JSON");
    assert_eq!(json["config_file_exists"], true);
    assert_eq!(json["settings"]["cell_count"], 8);
    assert_eq!(json["palette"]["busy"], "#FF0000");
    assert!(json["problems"].as_array().unwrap().is_empty());
}

#[test]
fn cli_config_reports_problems() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "cell_count = 0\n");
    cli()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("app_id is required"))
        .stdout(predicate::str::contains("cell_count must be between"));
}

#[test]
fn cli_config_init_writes_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    cli()
        .args(["config", "--init", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("# BusyIndicator configuration."));
    assert!(written.contains("poll_interval_secs = 2"));

    cli()
        .args(["config", "--init", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

// ── --verbose flag ──

#[test]
fn cli_verbose_flag_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "");
    cli()
        .args(["-vv", "config", "--config"])
        .arg(&path)
        .assert()
        .success();
}

// ── run / status refuse to start without an app_id ──

#[test]
fn cli_run_without_app_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "device = \"console\"\n");
    cli()
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("app_id is required"));
}

#[test]
fn cli_status_without_app_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "");
    cli()
        .args(["status", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}

// ── test pattern on the console strip ──

#[test]
fn cli_test_pattern_on_console() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "device = \"console\"\ncell_count = 4\n");
    cli()
        .args(["test", "--seconds", "0", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("cell 0 blue"))
        .stdout(predicate::str::contains("Done."));
}

#[test]
fn cli_test_state_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "device = \"console\"\ncell_count = 4\n");
    cli()
        .args(["test", "--seconds", "0", "--state", "do_not_disturb", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Do not disturb"));
}

#[test]
fn cli_test_unknown_state_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "device = \"console\"\n");
    cli()
        .args(["test", "--state", "lunch", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown state"));
}

#[test]
fn cli_test_rejects_bad_cell_count() {
    let dir = tempfile::tempdir().unwrap();
    for count in ["0", "1000"] {
        let path = write_config(
            dir.path(),
            &format!("device = \"console\"\ncell_count = {count}\n"),
        );
        cli()
            .args(["test", "--seconds", "0", "--config"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("cell_count must be between"))
            .stdout(predicate::str::contains("cell 0").not());
    }
}

#[test]
fn cli_test_rejects_unbounded_seconds() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "device = \"console\"\ncell_count = 4\n");
    cli()
        .args(["test", "--seconds", "18446744073709551615", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--seconds"));
}

#[test]
fn cli_run_rejects_unbounded_poll_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "app_id = \"abc\"\ndevice = \"console\"\npoll_interval_secs = 86400\n",
    );
    cli()
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_interval_secs must be at most"));
}

#[test]
fn cli_test_help_succeeds() {
    cli()
        .args(["test", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--seconds"));
}
