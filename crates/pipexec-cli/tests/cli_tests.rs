// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the `pipexec` binary.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;

fn pipexec() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("pipexec").expect("binary `pipexec` should be built")
}

// ── Help & version ──────────────────────────────────────────────────

#[test]
fn help_flag_prints_usage() {
    pipexec()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Run process pipelines with tracing"))
        .stdout(contains("run"))
        .stdout(contains("which"));
}

#[test]
fn version_flag_prints_version() {
    pipexec()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

// ── run ─────────────────────────────────────────────────────────────

#[test]
fn run_pipeline_from_command_line() {
    pipexec()
        .args(["run", "--", "echo", "a\nb\nc", "|", "grep", "b", "|", "sed", "s/b/B/"])
        .assert()
        .success()
        .stdout("B\n");
}

#[test]
fn run_passes_env_to_every_stage() {
    pipexec()
        .args([
            "run",
            "--env",
            "PIPEXEC_CLI_VAR=from-flag",
            "--",
            "echo",
            "x",
            "|",
            "sh",
            "-c",
            "cat >/dev/null; printf %s \"$PIPEXEC_CLI_VAR\"",
        ])
        .assert()
        .success()
        .stdout("from-flag");
}

#[test]
fn run_feeds_stdin_to_head() {
    pipexec()
        .args(["run", "--", "tr", "a-z", "A-Z"])
        .write_stdin("shout")
        .assert()
        .success()
        .stdout("SHOUT");
}

#[test]
fn run_exit_code_mirrors_failing_stage() {
    pipexec()
        .args(["run", "--", "sh", "-c", "exit 3"])
        .assert()
        .code(3)
        .stderr(contains("exit status 3"));
}

#[test]
fn run_not_found_exits_127() {
    pipexec()
        .args(["run", "--", "echo", "hi", "|", "definitely-not-installed-xyz"])
        .assert()
        .code(127)
        .stderr(contains("executable file not found in $PATH"));
}

#[test]
fn run_without_pipeline_fails() {
    pipexec()
        .arg("run")
        .assert()
        .failure()
        .stderr(contains("nothing to run"));
}

#[test]
fn run_rejects_malformed_env_flag() {
    pipexec()
        .args(["run", "--env", "NOEQUALS", "--", "true"])
        .assert()
        .failure()
        .stderr(contains("--env expects KEY=VALUE"));
}

#[test]
fn run_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [env]
        WHO = "config"

        [[stages]]
        command = "sh"
        args = ["-c", "printf 'hello %s' \"$WHO\""]

        [[stages]]
        command = "tr"
        args = ["a-z", "A-Z"]
        "#
    )
    .unwrap();

    pipexec()
        .args(["run", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout("HELLO CONFIG");
}

#[test]
fn debug_flag_logs_failure_diagnostics() {
    pipexec()
        .args(["--debug", "run", "--", "sh", "-c", "echo boom >&2; exit 1"])
        .assert()
        .code(1)
        .stderr(contains("failed to execute `sh`"))
        .stderr(contains("exec.output=\"boom\""));
}

// ── which / check ───────────────────────────────────────────────────

#[test]
fn which_prints_resolved_path() {
    pipexec()
        .args(["which", "sh"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("/sh\n"));
}

#[test]
fn which_unknown_fails() {
    pipexec()
        .args(["which", "definitely-not-installed-xyz"])
        .assert()
        .failure()
        .stderr(contains(
            r#"exec: "definitely-not-installed-xyz": executable file not found in $PATH"#,
        ));
}

#[test]
fn check_reports_validation_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "log_level = \"verbose\"").unwrap();

    pipexec()
        .args(["check", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stdout(contains("error: invalid log_level 'verbose'"))
        .stdout(contains("error: at least one stage is required"));
}

#[test]
fn check_accepts_valid_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[[stages]]\ncommand = \"sh\"").unwrap();

    pipexec()
        .args(["check", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(contains("config: ok (1 stages)"));
}
