//! CLI smoke tests for the `ada` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ada() -> Command {
    Command::cargo_bin("ada").expect("ada binary")
}

#[test]
fn help_lists_subcommands() {
    ada()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("stop"));
}

#[test]
fn run_help_shows_options() {
    ada()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-sessions"))
        .stdout(predicate::str::contains("--context-threshold"))
        .stdout(predicate::str::contains("--allow-dirty"));
}

#[test]
fn init_creates_backlog_and_workspace() {
    let temp = TempDir::new().unwrap();
    ada()
        .args(["--project", &temp.path().display().to_string(), "init", "--name", "demo"])
        .assert()
        .success();

    assert!(temp.path().join("feature-list.json").exists());
    assert!(temp.path().join(".ada/project.json").exists());
    assert!(temp.path().join(".ada/logs/sessions").is_dir());
    let gitignore = std::fs::read_to_string(temp.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".ada/"));
}

#[test]
fn status_reports_counts() {
    let temp = TempDir::new().unwrap();
    ada()
        .args(["--project", &temp.path().display().to_string(), "init", "--name", "demo"])
        .assert()
        .success();

    ada()
        .args(["--project", &temp.path().display().to_string(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("0 features"));
}

#[test]
fn run_fails_preflight_outside_git_repo() {
    let temp = TempDir::new().unwrap();
    ada()
        .args(["--project", &temp.path().display().to_string(), "init"])
        .assert()
        .success();

    // No git repository: preflight must abort with exit code 2.
    ada()
        .args([
            "--project",
            &temp.path().display().to_string(),
            "run",
            "--no-api",
        ])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .code(2);
}

#[test]
fn stop_writes_marker() {
    let temp = TempDir::new().unwrap();
    ada()
        .args(["--project", &temp.path().display().to_string(), "stop"])
        .assert()
        .success();
    assert!(temp.path().join(".ada/stop-requested").exists());
}
