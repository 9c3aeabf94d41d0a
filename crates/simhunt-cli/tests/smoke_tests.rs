//! Smoke tests for the simhunt CLI
//!
//! These tests verify basic CLI functionality works correctly.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the simhunt binary
fn simhunt() -> Command {
    let mut cmd = Command::cargo_bin("simhunt").expect("simhunt binary should exist");
    cmd.env_remove("RUST_LOG").arg("--color").arg("never");
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    simhunt()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_lists_commands() {
    simhunt()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("baseline"));
}

#[test]
fn test_no_args_fails() {
    simhunt().assert().failure();
}

// ============================================================================
// validate
// ============================================================================

#[test]
fn test_validate_crash_hunt_yaml() {
    let dir = TempDir::new().unwrap();
    let options = dir.path().join("hunt.yaml");
    fs::write(
        &options,
        concat!(
            "bundle_id: com.example.app\nduration_secs: 120\nseed: 99\n",
            "actions:\n  weights:\n    tap: 70\n    scroll: 20\n    swipe: 10\n    back: 0\n",
        ),
    )
    .unwrap();

    simhunt()
        .args(["validate", "crash-hunt"])
        .arg(&options)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[DRY-RUN] crash_hunt reason=dry_run"))
        .stdout(predicate::str::contains("seed=99"));
}

#[test]
fn test_validate_feature_ship_json() {
    let dir = TempDir::new().unwrap();
    let options = dir.path().join("ship.json");
    fs::write(
        &options,
        r#"{"bundle_id": "com.example.app", "max_iterations": 3,
            "assertions": [{"type": "element_exists", "identifier": "login"}]}"#,
    )
    .unwrap();

    simhunt()
        .args(["validate", "feature-ship"])
        .arg(&options)
        .assert()
        .success()
        .stdout(predicate::str::contains("iterations=0/3"));
}

#[test]
fn test_validate_rejects_invalid_options() {
    let dir = TempDir::new().unwrap();
    let options = dir.path().join("perf.yaml");
    fs::write(&options, "bundle_id: com.example.app\nruns: 0\n").unwrap();

    simhunt()
        .args(["validate", "performance-check"])
        .arg(&options)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid options"));
}

#[test]
fn test_validate_rejects_unknown_extension() {
    let dir = TempDir::new().unwrap();
    let options = dir.path().join("hunt.toml");
    fs::write(&options, "bundle_id = 'x'").unwrap();

    simhunt()
        .args(["validate", "crash-hunt"])
        .arg(&options)
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected a .yaml"));
}

// ============================================================================
// render
// ============================================================================

const CRASH_RESULT: &str = r#"{
    "completed": true,
    "termination_reason": "crash_limit",
    "simulator": "iPhone 15",
    "bundle_id": "com.example.app",
    "seed": 42,
    "duration_secs": 60,
    "elapsed_ms": 12000,
    "actions_performed": 0,
    "actions": [],
    "crashes_found": 0,
    "crashes": [],
    "max_depth_reached": 0,
    "depth_resets": 0,
    "artifacts_dir": null
}"#;

#[test]
fn test_render_compact() {
    let dir = TempDir::new().unwrap();
    let result = dir.path().join("crash_hunt_report.json");
    fs::write(&result, CRASH_RESULT).unwrap();

    simhunt()
        .arg("render")
        .arg(&result)
        .args(["--playbook", "crash-hunt", "--format", "compact"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[CLEAN] crash_hunt reason=crash_limit"));
}

#[test]
fn test_render_html_to_file() {
    let dir = TempDir::new().unwrap();
    let result = dir.path().join("crash_hunt_report.json");
    let output = dir.path().join("report.html");
    fs::write(&result, CRASH_RESULT).unwrap();

    simhunt()
        .arg("render")
        .arg(&result)
        .args(["-p", "crash-hunt", "-f", "html", "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let html = fs::read_to_string(output).unwrap();
    assert!(html.contains("Generated by simhunt"));
}

// ============================================================================
// baseline
// ============================================================================

#[test]
fn test_baseline_table() {
    let dir = TempDir::new().unwrap();
    let baseline = dir.path().join("baseline.json");
    fs::write(
        &baseline,
        r#"{"timestamp": "2026-01-02T03:04:05Z", "simulator": "iPhone 15",
            "bundle_id": "com.example.app", "warm_launch_avg_ms": 42.0}"#,
    )
    .unwrap();

    simhunt()
        .arg("baseline")
        .arg(&baseline)
        .assert()
        .success()
        .stdout(predicate::str::contains("Baseline for com.example.app on iPhone 15"))
        .stdout(predicate::str::contains("42.0"));
}

#[test]
fn test_baseline_missing_file() {
    simhunt()
        .args(["baseline", "/nonexistent/baseline.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Baseline error"));
}
