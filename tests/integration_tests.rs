//! Integration tests for the foreman CLI.
//!
//! These tests exercise the binary end to end against real plan files in
//! temporary project directories.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a foreman Command
fn foreman() -> Command {
    cargo_bin_cmd!("foreman")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Write a plan file into the project directory.
fn write_plan(dir: &TempDir, content: &str) {
    fs::write(dir.path().join("plan.json"), content).unwrap();
}

const TRIVIAL_PLAN: &str = r#"{
  "mode": "parallel",
  "steps": [
    {"id": "01", "description": "first", "files": [], "verify": {"command": "true"}},
    {"id": "02", "description": "second", "files": [], "verify": {"command": "true"}, "depends_on": ["01"]}
  ]
}"#;

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_foreman_help() {
        foreman().arg("--help").assert().success();
    }

    #[test]
    fn test_foreman_version() {
        foreman().arg("--version").assert().success();
    }

    #[test]
    fn test_missing_plan_file_fails() {
        let dir = create_temp_project();
        foreman()
            .current_dir(dir.path())
            .arg("validate")
            .assert()
            .failure();
    }
}

// =============================================================================
// Validate
// =============================================================================

mod validate {
    use super::*;

    #[test]
    fn test_validate_prints_batches() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);

        foreman()
            .current_dir(dir.path())
            .arg("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("2 batches"))
            .stdout(predicate::str::contains("Batch 0: 01"))
            .stdout(predicate::str::contains("Batch 1: 02"));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let dir = create_temp_project();
        write_plan(
            &dir,
            r#"{
  "steps": [
    {"id": "a", "description": "a", "files": [], "verify": {"command": "true"}, "depends_on": ["b"]},
    {"id": "b", "description": "b", "files": [], "verify": {"command": "true"}, "depends_on": ["a"]}
  ]
}"#,
        );

        foreman()
            .current_dir(dir.path())
            .arg("validate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("cycle").or(predicate::str::contains("Cycle")));
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let dir = create_temp_project();
        write_plan(
            &dir,
            r#"{
  "steps": [
    {"id": "a", "description": "a", "files": [], "verify": {"command": "true"}, "depends_on": ["ghost"]}
  ]
}"#,
        );

        foreman()
            .current_dir(dir.path())
            .arg("validate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("ghost"));
    }

    #[test]
    fn test_validate_respects_plan_flag() {
        let dir = create_temp_project();
        fs::write(dir.path().join("other.json"), TRIVIAL_PLAN).unwrap();

        foreman()
            .current_dir(dir.path())
            .args(["validate", "--plan", "other.json"])
            .assert()
            .success();
    }
}

// =============================================================================
// Run
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_run_succeeds_with_passing_verifications() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);

        foreman()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("Succeeded"));

        // Audit log written under the default directory.
        let runs_dir = dir.path().join(".foreman/audit/runs");
        assert!(runs_dir.exists());
        assert_eq!(fs::read_dir(&runs_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_run_applies_step_commands() {
        let dir = create_temp_project();
        write_plan(
            &dir,
            r#"{
  "mode": "sequential",
  "steps": [
    {"id": "mk", "description": "create marker", "files": ["marker.txt"],
     "apply": "echo done > marker.txt",
     "verify": {"command": "grep -q done marker.txt"}}
  ]
}"#,
        );

        foreman()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success();

        assert!(dir.path().join("marker.txt").exists());
    }

    #[test]
    fn test_failed_step_exits_nonzero_and_names_step() {
        let dir = create_temp_project();
        write_plan(
            &dir,
            r#"{
  "mode": "sequential",
  "steps": [
    {"id": "doomed", "description": "always fails", "files": [], "verify": {"command": "false"}},
    {"id": "after", "description": "never runs", "files": [], "verify": {"command": "true"}, "depends_on": ["doomed"]}
  ]
}"#,
        );

        foreman()
            .current_dir(dir.path())
            .args(["run", "--max-retries", "0"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("doomed"));
    }

    #[test]
    fn test_run_with_expected_exit_override() {
        let dir = create_temp_project();
        write_plan(
            &dir,
            r#"{
  "steps": [
    {"id": "odd", "description": "nonzero is fine", "files": [],
     "verify": {"command": "exit 1", "expect_exit": 1}}
  ]
}"#,
        );

        foreman()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success();
    }
}

// =============================================================================
// Status and audit inspection
// =============================================================================

mod inspection {
    use super::*;

    #[test]
    fn test_status_before_any_run_fails() {
        let dir = create_temp_project();
        foreman()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No runs"));
    }

    #[test]
    fn test_status_after_run_shows_terminal_state() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);

        foreman().current_dir(dir.path()).arg("run").assert().success();

        foreman()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Succeeded"))
            .stdout(predicate::str::contains("2 succeeded"));
    }

    #[test]
    fn test_audit_list_and_show() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);

        foreman().current_dir(dir.path()).arg("run").assert().success();

        foreman()
            .current_dir(dir.path())
            .args(["audit", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains(".jsonl"));

        foreman()
            .current_dir(dir.path())
            .args(["audit", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("01 attempt 1"))
            .stdout(predicate::str::contains("succeeded"));
    }

    #[test]
    fn test_failed_run_audit_records_attempts() {
        let dir = create_temp_project();
        write_plan(
            &dir,
            r#"{
  "steps": [
    {"id": "flappy", "description": "fails", "files": [], "verify": {"command": "false"}}
  ]
}"#,
        );

        foreman()
            .current_dir(dir.path())
            .args(["run", "--max-retries", "1"])
            .assert()
            .code(1);

        // One initial attempt plus one retry.
        foreman()
            .current_dir(dir.path())
            .args(["audit", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("flappy attempt 1"))
            .stdout(predicate::str::contains("flappy attempt 2"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_invalid_config_key_fails_loudly() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);
        fs::write(dir.path().join("foreman.toml"), "max_paralel = 2\n").unwrap();

        foreman()
            .current_dir(dir.path())
            .arg("validate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("foreman.toml"));
    }

    #[test]
    fn test_config_audit_dir_respected() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);
        fs::write(dir.path().join("foreman.toml"), "audit_dir = \"logs/audit\"\n").unwrap();

        foreman().current_dir(dir.path()).arg("run").assert().success();

        assert!(dir.path().join("logs/audit/runs").exists());
    }

    #[test]
    fn test_subagent_backend_requires_command() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);
        fs::write(dir.path().join("foreman.toml"), "worker = \"subagent\"\n").unwrap();

        foreman()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("subagent_cmd"));
    }

    #[test]
    fn test_subagent_backend_runs_with_stub_agent() {
        let dir = create_temp_project();
        write_plan(&dir, TRIVIAL_PLAN);
        // A stand-in agent that consumes the step JSON and exits zero.
        fs::write(
            dir.path().join("agent.sh"),
            "#!/bin/sh\ncat > /dev/null\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("foreman.toml"),
            "worker = \"subagent\"\nsubagent_cmd = \"sh agent.sh\"\n",
        )
        .unwrap();

        foreman()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success();
    }
}
