//! Integration tests for the ea-lidar CLI surface
//!
//! Everything here must fail (or print help) before any cloud call is made.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn ea_lidar() -> Command {
    Command::cargo_bin("ea-lidar").expect("ea-lidar binary should exist")
}

#[test]
fn test_cli_no_args_shows_help_and_exits_nonzero() {
    // clap with arg_required_else_help shows help on stderr and exits 2
    ea_lidar()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_help_flag_shows_help() {
    ea_lidar()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--s3-output"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    ea_lidar()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ea-lidar"));
}

#[test]
fn test_missing_s3_output_is_a_usage_error() {
    ea_lidar()
        .arg("site.shp")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--s3-output"));
}

#[test]
fn test_non_s3_output_is_rejected_before_any_cloud_call() {
    let dir = tempfile::tempdir().expect("tempdir");
    let shp = dir.path().join("site.shp");
    std::fs::write(&shp, b"shp").expect("write");

    ea_lidar()
        .arg(&shp)
        .args(["--s3-output", "https://bucket/out/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --s3-output"));
}

#[test]
fn test_missing_local_aoi_is_rejected_before_any_cloud_call() {
    ea_lidar()
        .args(["/definitely/not/here.shp", "--s3-output", "s3://bucket/out/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AOI file not found"));
}
