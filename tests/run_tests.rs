use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

/// Find all test directories in tests/run/
fn find_run_tests() -> Vec<PathBuf> {
    let run_dir = Path::new("tests/run");
    let mut test_dirs = Vec::new();

    if let Ok(entries) = fs::read_dir(run_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && path.join("main.vb").exists() {
                test_dirs.push(path);
            }
        }
    }

    test_dirs.sort();
    test_dirs
}

/// Run a single test case: `query` when a query.scm is present, else `parse --sexp`
fn run_test_case(test_dir: &Path) -> Result<(), String> {
    let test_name = test_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let main_file = test_dir.join("main.vb");
    let expected_output = fs::read_to_string(test_dir.join("expected_output.txt"))
        .map_err(|e| format!("Test '{}': failed to read expected_output.txt: {}", test_name, e))?;
    let expected_status = match fs::read_to_string(test_dir.join("expected_status.txt")) {
        Ok(status) => status
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("Test '{}': bad expected_status.txt: {}", test_name, e))?,
        Err(_) => 0,
    };

    let mut cmd = Command::cargo_bin("vbnet-parser").map_err(|e| e.to_string())?;
    match fs::read_to_string(test_dir.join("query.scm")) {
        Ok(pattern) => cmd.arg("query").arg(&main_file).arg(pattern.trim()),
        Err(_) => cmd.arg("parse").arg("--sexp").arg(&main_file),
    };

    let output = cmd
        .output()
        .map_err(|e| format!("Test '{}': failed to execute: {}", test_name, e))?;

    if output.status.code() != Some(expected_status) {
        return Err(format!(
            "Test '{}': expected exit code {}, got {:?}\nStderr: {}",
            test_name,
            expected_status,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let actual_output = String::from_utf8_lossy(&output.stdout);
    if actual_output.trim() != expected_output.trim() {
        return Err(format!(
            "Test '{}': output mismatch\nExpected:\n{}\nActual:\n{}",
            test_name,
            expected_output.trim(),
            actual_output.trim()
        ));
    }

    Ok(())
}

#[test]
fn test_run_integration() {
    let test_dirs = find_run_tests();

    if test_dirs.is_empty() {
        panic!("No integration tests found in tests/run/");
    }

    let mut failures = Vec::new();

    for test_dir in &test_dirs {
        let test_name = test_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        print!("Running test '{}' ... ", test_name);

        match run_test_case(test_dir) {
            Ok(_) => println!("ok"),
            Err(e) => {
                println!("FAILED");
                failures.push(e);
            }
        }
    }

    if !failures.is_empty() {
        eprintln!("\nFailures:");
        for failure in &failures {
            eprintln!("  {}", failure);
        }
        panic!("{} test(s) failed", failures.len());
    }
}

// Individual test for each test case - makes it easier to run specific tests
#[test]
fn test_run_hello_module() {
    if let Err(e) = run_test_case(Path::new("tests/run/hello_module")) {
        panic!("{}", e);
    }
}

#[test]
fn test_missing_file_fails() {
    Command::cargo_bin("vbnet-parser")
        .unwrap()
        .args(["parse", "tests/run/no_such_dir/main.vb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_tokens_command() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("main.vb");
    fs::write(&file, "x = 1 ' set x\n").unwrap();

    Command::cargo_bin("vbnet-parser")
        .unwrap()
        .arg("tokens")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("1:1 identifier \"x\"\n"))
        .stdout(predicate::str::contains("1:5 integer_literal \"1\""))
        .stdout(predicate::str::contains("set x").not());
}

#[test]
fn test_config_limits_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("limits.toml");
    fs::write(&config, "[limits]\nmax_input_size = 10\n").unwrap();

    Command::cargo_bin("vbnet-parser")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .args(["parse", "tests/run/hello_module/main.vb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input too large"));
}

#[test]
fn test_invalid_query_is_reported() {
    Command::cargo_bin("vbnet-parser")
        .unwrap()
        .args(["query", "tests/run/hello_module/main.vb", "(no_such_rule)"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node kind 'no_such_rule'"));
}

#[test]
fn test_outline_output() {
    Command::cargo_bin("vbnet-parser")
        .unwrap()
        .args(["parse", "tests/run/hello_module/main.vb"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("source_file [1:1 - 27:1]\n"))
        .stdout(predicate::str::contains("name: identifier [2:9 - 2:13] \"Main\""));
}
