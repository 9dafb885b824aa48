//! CLI-level tests for demobot.
//!
//! These cover the observable process behavior: help/version, the
//! missing-configuration exit path, and the redacted config display.
//! Reconciliation itself needs live remotes and is covered at the
//! component level in the library's unit tests.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a demobot command with a clean environment, run from
/// a temp directory so no stray `.env` file leaks in.
fn demobot(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("demobot").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("GH_TOKEN")
        .env_remove("OPENAI_API_KEY")
        .env_remove("TARGET_REPOS")
        .env_remove("PYTHON_DEMONSTRATOR_LABEL")
        .env_remove("DEMOBOT_CLONE_ROOT")
        .env_remove("OPENAI_MODEL")
        .env_remove("OPENAI_BASE_URL");
    cmd
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    demobot(&dir).arg("--help").assert().success();
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    demobot(&dir).arg("--version").assert().success();
}

#[test]
fn test_run_without_config_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    demobot(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required environment variable"));
}

#[test]
fn test_run_names_the_missing_variable() {
    let dir = TempDir::new().unwrap();
    demobot(&dir)
        .arg("run")
        .env("GH_TOKEN", "ghp_test")
        .env("TARGET_REPOS", "acme/widgets")
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_config_shows_repos_and_redacts_secrets() {
    let dir = TempDir::new().unwrap();
    demobot(&dir)
        .arg("config")
        .env("GH_TOKEN", "ghp_supersecrettoken")
        .env("OPENAI_API_KEY", "sk-anothersecret")
        .env("TARGET_REPOS", "org1/repoA,org2/repoB")
        .assert()
        .success()
        .stdout(predicate::str::contains("org1/repoA"))
        .stdout(predicate::str::contains("org2/repoB"))
        .stdout(predicate::str::contains("python_demonstrator"))
        .stdout(predicate::str::contains("ghp_supersecrettoken").not());
}

#[test]
fn test_config_rejects_malformed_repo_slug() {
    let dir = TempDir::new().unwrap();
    demobot(&dir)
        .arg("config")
        .env("GH_TOKEN", "ghp_test")
        .env("OPENAI_API_KEY", "sk-test")
        .env("TARGET_REPOS", "not-a-slug")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-a-slug"));
}
