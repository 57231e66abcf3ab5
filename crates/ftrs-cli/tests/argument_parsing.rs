//! Focused CLI argument parsing tests — exit codes and usage text only,
//! no component connectivity.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_flag_shows_usage() {
    Command::cargo_bin("ftrs")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("replicated state-machine"));
}

#[test]
fn version_flag_succeeds() {
    Command::cargo_bin("ftrs").unwrap().arg("--version").assert().success();
}

#[test]
fn missing_subcommand_fails() {
    Command::cargo_bin("ftrs").unwrap().assert().failure();
}

#[test]
fn server_without_required_id_fails() {
    Command::cargo_bin("ftrs")
        .unwrap()
        .args(["server", "--port", "5000"])
        .assert()
        .failure();
}

#[test]
fn client_without_any_replica_fails() {
    Command::cargo_bin("ftrs")
        .unwrap()
        .args(["client", "--id", "c1"])
        .assert()
        .failure();
}

#[test]
fn devnet_help_lists_base_port() {
    Command::cargo_bin("ftrs")
        .unwrap()
        .args(["devnet", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("base-port"));
}
