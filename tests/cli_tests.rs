//! Integration tests for the docbind CLI
//!
//! These tests run the actual CLI binary and verify output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get the binary to test
fn docbind_cmd() -> Command {
    let mut cmd = Command::cargo_bin("docbind").unwrap();
    cmd.env("NO_COLOR", "1");
    cmd
}

fn write_doc(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_help_flag() {
    docbind_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Format-preserving YAML/JSON binding toolkit"))
        .stdout(predicate::str::contains("roundtrip"));
}

#[test]
fn test_roundtrip_help() {
    docbind_cmd()
        .args(["roundtrip", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--set"))
        .stdout(predicate::str::contains("--remove"))
        .stdout(predicate::str::contains("--output"));
}

// ============================================================================
// check
// ============================================================================

#[test]
fn test_check_valid_document() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(
        &temp_dir,
        "api.yaml",
        r#"
openapi: 3.1.0
info:
  title: Demo
  version: "1.0"
paths: {}
"#,
    );

    docbind_cmd()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"))
        .stdout(predicate::str::contains("3 top-level keys"));
}

#[test]
fn test_check_reports_nested_duplicates_as_warnings() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(
        &temp_dir,
        "dup.yaml",
        "name: a\nnested:\n  key: 1\n  key: 2\n",
    );

    docbind_cmd()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning [4:3] duplicate key"))
        .stdout(predicate::str::contains("already defined at line 3"))
        .stdout(predicate::str::contains("1 warning(s)"));
}

#[test]
fn test_check_strict_fails_on_warnings() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "dup.yaml", "a: 1\na: 2\n");

    docbind_cmd()
        .args(["check", "--strict", file.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("0 error(s), 1 warning(s)"));
}

#[test]
fn test_check_sequence_root_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "list.yaml", "- a\n- b\n");

    docbind_cmd()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("type mismatch"));
}

#[test]
fn test_check_missing_file() {
    docbind_cmd()
        .args(["check", "/nonexistent/api.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_check_invalid_yaml_shows_fix() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "broken.yaml", "a: [1, 2\n");

    docbind_cmd()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[BIND-010]"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_check_empty_document() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "empty.yaml", "\n");

    docbind_cmd()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[BIND-001]"));
}

// ============================================================================
// roundtrip
// ============================================================================

#[test]
fn test_roundtrip_applies_edits_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(
        &temp_dir,
        "api.yaml",
        "openapi: 3.0.0\nobsolete: true\ninfo:\n  title: Demo\n",
    );

    docbind_cmd()
        .args([
            "roundtrip",
            file.to_str().unwrap(),
            "--set",
            "openapi=3.1.0",
            "--set",
            "x-owner=platform",
            "--remove",
            "obsolete",
        ])
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "openapi: 3.1.0\ninfo:\n  title: Demo\nx-owner: platform\n",
        ));
}

#[test]
fn test_roundtrip_writes_output_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "api.yaml", "b: 1\na: 2\n");
    let output = temp_dir.path().join("out.yaml");

    docbind_cmd()
        .args(["roundtrip", file.to_str().unwrap(), "-o", output.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("wrote"));

    assert_eq!(fs::read_to_string(&output).unwrap(), "b: 1\na: 2\n");
}

#[test]
fn test_roundtrip_rejects_bad_assignment() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "api.yaml", "a: 1\n");

    docbind_cmd()
        .args(["roundtrip", file.to_str().unwrap(), "--set", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--set expects KEY=VALUE"));
}

#[test]
fn test_roundtrip_sequence_root_fails() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "list.yaml", "- a\n");

    docbind_cmd()
        .args(["roundtrip", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot round-trip"));
}

// ============================================================================
// tree
// ============================================================================

#[test]
fn test_tree_prints_kinds_and_positions() {
    let temp_dir = TempDir::new().unwrap();
    let file = write_doc(&temp_dir, "api.yaml", "name: demo\ntags:\n  - a\n");

    docbind_cmd()
        .args(["tree", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("document 1:1"))
        .stdout(predicate::str::contains("name: scalar \"demo\" !!str 1:7"))
        .stdout(predicate::str::contains("tags: sequence 3:3"))
        .stdout(predicate::str::contains("- scalar \"a\" !!str 3:5"));
}
