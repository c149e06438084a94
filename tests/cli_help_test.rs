//! CLI surface smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_the_lifecycle_subcommands() {
    let mut cmd = Command::cargo_bin("registrar").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn check_requires_a_domain_argument() {
    let mut cmd = Command::cargo_bin("registrar").unwrap();
    cmd.arg("check").assert().failure();
}

#[test]
fn unknown_subcommands_are_rejected() {
    let mut cmd = Command::cargo_bin("registrar").unwrap();
    cmd.arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
