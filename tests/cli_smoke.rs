use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn boss_relay(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("boss-relay").unwrap();
    cmd.current_dir(dir).env_remove("SLACK_BOT_TOKEN");
    cmd
}

fn write_config(dir: &Path, workdir: &Path) -> std::path::PathBuf {
    let path = dir.join("boss-relay.toml");
    std::fs::write(
        &path,
        format!(
            "workdir = {:?}\n\n[channels]\nops = \"C0OPS\"\n\n[agent]\nprogram = \"nonexistent-agent-xyz\"\ninstruction_files = []\n",
            workdir.display().to_string()
        ),
    )
    .unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    boss_relay(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("doctor"))
        .stdout(predicate::str::contains("init-config"))
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn schema_prints_json_schema() {
    let dir = tempfile::tempdir().unwrap();
    boss_relay(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"workdir\""))
        .stdout(predicate::str::contains("\"channels\""));
}

#[test]
fn run_without_config_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    boss_relay(dir.path())
        .arg("run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("boss-relay.toml"));
}

#[test]
fn run_without_token_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), dir.path());
    boss_relay(dir.path())
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SLACK_BOT_TOKEN"));
}

#[test]
fn run_with_missing_workdir_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("missing"));
    boss_relay(dir.path())
        .env("SLACK_BOT_TOKEN", "xoxb-test")
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn run_rejects_zero_interval() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), dir.path());
    boss_relay(dir.path())
        .env("SLACK_BOT_TOKEN", "xoxb-test")
        .args(["run", "--interval", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("poll_interval_secs"));
}

#[test]
fn init_config_writes_once() {
    let dir = tempfile::tempdir().unwrap();
    boss_relay(dir.path())
        .arg("init-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("boss-relay.toml"));

    let written = std::fs::read_to_string(dir.path().join("boss-relay.toml")).unwrap();
    assert!(written.contains("[channels]"));
    assert!(written.contains("workdir"));

    boss_relay(dir.path())
        .arg("init-config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));

    boss_relay(dir.path())
        .args(["init-config", "--force"])
        .assert()
        .success();
}

#[test]
fn doctor_offline_counts_issues() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), dir.path());
    // Missing token and missing agent executable.
    boss_relay(dir.path())
        .args(["doctor", "--offline", "--format", "json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"unchecked\""))
        .stdout(predicate::str::contains("SLACK_BOT_TOKEN is not set"))
        .stdout(predicate::str::contains("Agent not found: nonexistent-agent-xyz"));
}

#[test]
fn doctor_reports_failing_agent_version() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("boss-relay.toml"),
        format!(
            "workdir = {:?}\n\n[channels]\nops = \"C0OPS\"\n\n[agent]\nprogram = \"false\"\ninstruction_files = []\n",
            dir.path().display().to_string()
        ),
    )
    .unwrap();
    boss_relay(dir.path())
        .env("SLACK_BOT_TOKEN", "xoxb-test")
        .args(["doctor", "--offline", "--format", "text"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("false --version exited with 1"));
}

#[test]
fn doctor_text_output() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), dir.path());
    boss_relay(dir.path())
        .env("SLACK_BOT_TOKEN", "xoxb-test")
        .args(["doctor", "--offline", "--format", "text"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("slack  unchecked"))
        .stdout(predicate::str::contains("channel  ops  C0OPS  unchecked"))
        .stdout(predicate::str::contains("agent  nonexistent-agent-xyz  missing"));
}
