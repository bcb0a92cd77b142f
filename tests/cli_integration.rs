//! CLI integration tests.
//!
//! These tests verify argument parsing, configuration loading, and the
//! exit codes of the `shell-execute` binary.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

use shell_execute::cli::{parse_args_from, Args};
use shell_execute::config::Config;
use shell_execute::{AcceptedStatus, Escalation};

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("shell-execute")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&["true"])).unwrap();

    assert_eq!(result.command, vec!["true"]);
    assert!(result.host.is_none());
    assert!(result.user.is_none());
    assert!(result.timeout.is_none());
    assert!(!result.strict);
    assert!(result.config.is_none());
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-H",
        "db1",
        "-u",
        "postgres",
        "-t",
        "2.5",
        "-s",
        "0,1",
        "-e",
        "psql failed",
        "-l",
        "debug",
        "--escalation",
        "sudo_user",
        "psql",
        "-c",
        "select 1",
    ]))
    .unwrap();

    assert_eq!(result.host.as_deref(), Some("db1"));
    assert_eq!(result.user.as_deref(), Some("postgres"));
    assert_eq!(result.timeout, Some(2.5));
    assert_eq!(result.status, Some(AcceptedStatus::codes([0, 1]).unwrap()));
    assert_eq!(result.emsg.as_deref(), Some("psql failed"));
    assert_eq!(result.log_level, Some("debug".to_string()));
    assert_eq!(result.escalation, Some(Escalation::SudoUser));
    // flags after the first command word belong to the command
    assert_eq!(result.command, vec!["psql", "-c", "select 1"]);
    assert!(result.config.is_none());
}

#[test]
fn test_cli_config_file() {
    let result = parse_args_from(args(&["-c", "/etc/shell-execute.json", "true"])).unwrap();

    assert_eq!(
        result.config.unwrap().to_str().unwrap(),
        "/etc/shell-execute.json"
    );
}

#[test]
fn test_cli_invalid_timeout() {
    assert!(parse_args_from(args(&["-t", "soon", "true"])).is_err());
    assert!(parse_args_from(args(&["-t", "NaN", "true"])).is_err());
}

#[test]
fn test_cli_invalid_status() {
    assert!(parse_args_from(args(&["-s", "zero", "true"])).is_err());
}

#[test]
fn test_cli_missing_command() {
    let result = parse_args_from(args(&["-u", "bob"])).unwrap();
    assert!(result.command_line().is_err());
}

#[test]
fn test_cli_unknown_flag() {
    assert!(parse_args_from(args(&["--bogus", "true"])).is_err());
}

// ============================================================================
// Config File Tests
// ============================================================================

#[test]
fn test_config_file_loading() {
    let config_json = r#"{
        "execution": {
            "shell": "/bin/bash",
            "kill_grace_ms": 300
        },
        "logging": {
            "level": "warn"
        }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_json.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.execution.shell, PathBuf::from("/bin/bash"));
    assert_eq!(config.execution.kill_grace_ms, 300);
    assert_eq!(config.logging.level, "warn");
}

#[test]
fn test_config_empty_json() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"{}").unwrap();

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.execution.shell, PathBuf::from("/bin/sh"));
    assert_eq!(config.execution.escalation, Escalation::LoginShell);
}

#[test]
fn test_config_cli_overrides_file() {
    let config_json = r#"{
        "execution": { "shell": "/bin/bash", "escalation": "login_shell" },
        "logging": { "level": "warn" }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_json.as_bytes()).unwrap();

    let mut config = Config::from_file(file.path()).unwrap();
    let args = Args {
        shell: Some(PathBuf::from("/bin/dash")),
        escalation: Some(Escalation::SudoUser),
        log_level: Some("trace".to_string()),
        ..Args::default()
    };
    config.apply_args(&args);

    assert_eq!(config.execution.shell, PathBuf::from("/bin/dash"));
    assert_eq!(config.execution.escalation, Escalation::SudoUser);
    assert_eq!(config.logging.level, "trace");
}

#[test]
fn test_config_to_executor_config() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"{ "execution": { "default_timeout_secs": 0.25 } }"#)
        .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    let executor = config.executor_config().unwrap();

    assert_eq!(executor.default_timeout, Some(Duration::from_millis(250)));
}

// ============================================================================
// Binary Tests
// ============================================================================

#[cfg(unix)]
mod binary {
    use std::io::Write;
    use std::process::{Command, Output, Stdio};

    fn shell_execute(args: &[&str], input: Option<&str>) -> Output {
        let mut child = Command::new(env!("CARGO_BIN_EXE_shell-execute"))
            .args(args)
            .env_remove("RUST_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(input.unwrap_or("").as_bytes()).unwrap();
        drop(stdin);
        child.wait_with_output().unwrap()
    }

    #[test]
    fn test_forwards_stdout_and_status() {
        let output = shell_execute(&["echo", "hello"], None);
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(output.stdout, b"hello\n");

        let output = shell_execute(&["exit 3"], None);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_strict_failure_message() {
        let output = shell_execute(&["--strict", "false"], None);
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).contains("false"));

        let output = shell_execute(&["-e", "custom failure", "exit 4"], None);
        assert_eq!(output.status.code(), Some(4));
        assert!(String::from_utf8_lossy(&output.stderr).contains("custom failure"));
    }

    #[test]
    fn test_accepted_status_succeeds() {
        let output = shell_execute(&["-s", "any", "exit 9"], None);
        assert_eq!(output.status.code(), Some(9));
        assert!(output.stderr.is_empty());
    }

    #[test]
    fn test_stdin_payload() {
        let output = shell_execute(&["-i", "-", "cat", "-"], Some("line 1\nline 2"));
        assert_eq!(output.stdout, b"line 1\nline 2");
    }

    #[test]
    fn test_timeout_exit_code() {
        let output = shell_execute(&["-t", "0.3", "echo started; sleep 5"], None);
        assert_eq!(output.status.code(), Some(124));
        assert_eq!(output.stdout, b"started\n");
    }

    #[test]
    fn test_bad_options_json() {
        let output = shell_execute(&["--options", r#"{"bogus": 1}"#, "true"], None);
        assert_eq!(output.status.code(), Some(125));
    }

    #[test]
    fn test_missing_command_is_usage_error() {
        let output = shell_execute(&[], None);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_help() {
        let output = shell_execute(&["--help"], None);
        assert_eq!(output.status.code(), Some(0));
        assert!(String::from_utf8_lossy(&output.stdout).contains("shell-execute"));
    }
}
