//! CLI argument-parsing and pre-flight tests for the `cic` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[allow(deprecated)]
fn cic() -> Command {
    Command::cargo_bin("cic").expect("failed to find cic binary")
}

#[test]
fn help_lists_every_flag() {
    cic()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--data-dir"))
        .stdout(predicate::str::contains("--bind-addr"))
        .stdout(predicate::str::contains("--keys-file"))
        .stdout(predicate::str::contains("--gateway-url"))
        .stdout(predicate::str::contains("--sync-workers"));
}

#[test]
fn version_flag_succeeds() {
    cic().arg("--version").assert().success();
}

#[test]
fn unwritable_data_dir_fails_preflight_before_binding() {
    let dir = tempdir().unwrap();
    // A regular file in place of the data directory: create_dir_all on top
    // of it must fail, and failure must surface before any listener opens.
    let blocked = dir.path().join("not-a-dir");
    fs::write(&blocked, b"").unwrap();

    cic()
        .arg("--data-dir")
        .arg(&blocked)
        .arg("--bind-addr")
        .arg("127.0.0.1:0")
        .assert()
        .failure();
}
