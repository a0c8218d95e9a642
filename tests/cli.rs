//! Integration tests for the cellflow binary.

use std::path::PathBuf;
use std::process::Command;

const NOTEBOOK: &str = r#"{
  "cells": [
    {"type": "input", "id": "a", "variableName": "a", "content": "2"},
    {"type": "input", "id": "b", "variableName": "b", "content": "3"},
    {"type": "formula", "id": "f1", "variableName": "c", "formula": "a + b"},
    {"type": "markdown", "id": "m1", "content": "Total: {{c|round,1}}"}
  ]
}"#;

fn write_notebook(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("cellflow-cli-{}-{}", std::process::id(), name));
    std::fs::write(&path, content).expect("Failed to write notebook");
    path
}

fn run_cellflow(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_cellflow"))
        .env_remove("CELLFLOW_LOG")
        .args(args)
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

#[test]
fn test_prints_rendered_notebook() {
    let path = write_notebook("render.json", NOTEBOOK);
    let (stdout, _, code) = run_cellflow(&["--config", "/dev/null", path.to_str().unwrap()]);
    std::fs::remove_file(&path).unwrap();

    assert_eq!(code, 0);
    assert!(stdout.contains("`c` = 5"));
    assert!(stdout.trim_end().ends_with("Total: 5.0"));
}

#[test]
fn test_set_overrides_input_and_vars_lists_values() {
    let path = write_notebook("vars.json", NOTEBOOK);
    let (stdout, _, code) = run_cellflow(&[
        "--config",
        "/dev/null",
        "--set",
        "a=10",
        "--vars",
        path.to_str().unwrap(),
    ]);
    std::fs::remove_file(&path).unwrap();

    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "a = 10\nb = 3\nc = 13");
}

#[test]
fn test_cell_faults_are_reported_without_failing() {
    let path = write_notebook(
        "fault.json",
        r#"[{"type": "script", "id": "s1", "content": "throw \"broken\";"}]"#,
    );
    let (_, stderr, code) = run_cellflow(&["--config", "/dev/null", path.to_str().unwrap()]);
    std::fs::remove_file(&path).unwrap();

    assert_eq!(code, 0);
    assert!(stderr.contains("Warning: cell s1:"));
    assert!(stderr.contains("broken"));
}

#[test]
fn test_missing_notebook_is_an_error() {
    let (_, stderr, code) = run_cellflow(&["--config", "/dev/null", "/nonexistent/notebook.json"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Error:"));
}

#[test]
fn test_unknown_option_prints_usage() {
    let (_, stderr, code) = run_cellflow(&["--frobnicate"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Usage: cellflow"));
}
