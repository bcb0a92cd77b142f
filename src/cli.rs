//! Command-line interface for shell-execute.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::ExecuteError;
use crate::execution::{
    timeout_from_secs, AcceptedStatus, Escalation, InvocationResult, Request, RunOptions,
};

/// Exit code when the time limit passed (same as `timeout(1)`).
pub const EXIT_TIMEOUT: u8 = 124;
/// Exit code when the command could not be run at all.
pub const EXIT_CANNOT_RUN: u8 = 125;
/// Exit code for usage errors.
pub const EXIT_USAGE: u8 = 2;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Command words, joined with spaces into one shell command.
    pub command: Vec<String>,
    /// Host to run on.
    pub host: Option<String>,
    /// User to run as.
    pub user: Option<String>,
    /// Time limit in seconds.
    pub timeout: Option<f64>,
    /// File whose contents become the command's stdin (`-` for our own stdin).
    pub stdin: Option<PathBuf>,
    /// Accepted exit statuses; implies strict mode.
    pub status: Option<AcceptedStatus>,
    /// Failure message template; implies strict mode.
    pub emsg: Option<String>,
    /// Fail when the exit status is not accepted.
    pub strict: bool,
    /// Echo the final command before running it.
    pub debug: bool,
    /// Options as a JSON object; explicit flags win over it.
    pub options: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Shell override.
    pub shell: Option<PathBuf>,
    /// Escalation style override.
    pub escalation: Option<Escalation>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Args {
    /// The command string handed to the executor.
    pub fn command_line(&self) -> Result<String, ArgsError> {
        if self.command.is_empty() {
            return Err(ArgsError::MissingCommand);
        }
        Ok(self.command.join(" "))
    }

    /// Whether the strict entry point should be used.
    pub fn is_strict(&self, options: &RunOptions) -> bool {
        self.strict || options.status.is_some() || options.emsg.is_some()
    }

    /// Merge `--options` JSON with the explicit flags.
    pub fn run_options(&self) -> Result<RunOptions, ArgsError> {
        let mut options = match self.options {
            Some(ref json) => RunOptions::from_json(json)?,
            None => RunOptions::default(),
        };

        if let Some(ref host) = self.host {
            options.host = Some(host.clone());
        }
        if let Some(ref user) = self.user {
            options.user = Some(user.clone());
        }
        if let Some(secs) = self.timeout {
            options.timeout = Some(secs);
        }
        if let Some(ref status) = self.status {
            options.status = Some(status.clone());
        }
        if let Some(ref emsg) = self.emsg {
            options.emsg = Some(emsg.clone());
        }
        options.debug |= self.debug;

        Ok(options)
    }

    /// Raw bytes named by `--stdin`, if any.
    pub fn stdin_payload(&self) -> Result<Option<Vec<u8>>, ArgsError> {
        self.stdin.as_deref().map(read_payload).transpose()
    }

    /// Build the request from the command words, merged `options`, and the
    /// stdin payload. The payload file wins over a `stdin` JSON key.
    pub fn request(&self, options: &RunOptions) -> Result<Request, ArgsError> {
        let mut builder = options.to_builder(self.command_line()?)?;
        if let Some(payload) = self.stdin_payload()? {
            builder = builder.stdin(payload);
        }
        Ok(builder.build()?)
    }
}

fn read_payload(path: &Path) -> Result<Vec<u8>, ArgsError> {
    if path.as_os_str() == "-" {
        let mut payload = Vec::new();
        std::io::stdin().read_to_end(&mut payload)?;
        Ok(payload)
    } else {
        Ok(std::fs::read(path)?)
    }
}

/// Parse an accepted-status argument: `any`, or comma-separated codes.
pub fn parse_status(value: &str) -> Result<AcceptedStatus, ArgsError> {
    if value.eq_ignore_ascii_case("any") {
        return Ok(AcceptedStatus::Any);
    }
    let codes = value
        .split(',')
        .map(|code| code.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ArgsError::InvalidValue("status", value.to_string()))?;
    AcceptedStatus::codes(codes).map_err(|_| ArgsError::InvalidValue("status", value.to_string()))
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
///
/// The first positional argument starts the command; everything after it is
/// taken verbatim, so `shell-execute ls -la` needs no `--`.
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                result.host = Some(parser.value()?.parse()?);
            }
            Short('u') | Long("user") => {
                result.user = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("timeout", value.clone()))?;
                timeout_from_secs(secs).map_err(|_| ArgsError::InvalidValue("timeout", value))?;
                result.timeout = Some(secs);
            }
            Short('i') | Long("stdin") => {
                result.stdin = Some(parser.value()?.parse()?);
            }
            Short('s') | Long("status") => {
                let value: String = parser.value()?.parse()?;
                result.status = Some(parse_status(&value)?);
            }
            Short('e') | Long("emsg") => {
                result.emsg = Some(parser.value()?.parse()?);
            }
            Long("strict") => {
                result.strict = true;
            }
            Short('d') | Long("debug") => {
                result.debug = true;
            }
            Long("options") => {
                result.options = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Long("shell") => {
                result.shell = Some(parser.value()?.parse()?);
            }
            Long("escalation") => {
                let value: String = parser.value()?.parse()?;
                result.escalation = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("escalation", value))?,
                );
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                result.command.push(val.string()?);
                for rest in parser.raw_args()? {
                    result.command.push(rest.string()?);
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Map an execution outcome to the process exit code of this binary.
pub fn exit_code_for(outcome: &crate::Result<InvocationResult>) -> u8 {
    match outcome {
        Ok(result) => status_byte(result.exit_status),
        Err(ExecuteError::StatusMismatch { status, .. }) => match status_byte(*status) {
            0 => 1,
            code => code,
        },
        Err(ExecuteError::Timeout { .. }) => EXIT_TIMEOUT,
        Err(_) => EXIT_CANNOT_RUN,
    }
}

fn status_byte(status: i32) -> u8 {
    u8::try_from(status).unwrap_or(1)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"shell-execute {version}
Run one shell command, optionally as another user or on another host

USAGE:
    shell-execute [OPTIONS] [--] <COMMAND>...

OPTIONS:
    -H, --host <HOST>       Run on HOST over ssh (localhost runs locally)
    -u, --user <USER>       Run as USER via sudo
    -t, --timeout <SECS>    Terminate the command after SECS seconds
    -i, --stdin <FILE>      Feed FILE to the command's stdin ('-' for ours)
    -s, --status <CODES>    Accepted exit statuses: 'any' or '0,2,...' (implies --strict)
    -e, --emsg <TEXT>       Failure message (implies --strict)
        --strict            Fail unless the exit status is accepted [default: 0]
    -d, --debug             Log the final command before running it
        --options <JSON>    Options as a JSON object (flags take precedence)
    -c, --config <FILE>     Path to configuration file (JSON)
        --shell <PATH>      Shell used to run the command [default: /bin/sh]
        --escalation <S>    'login_shell' (sudo su -lc) or 'sudo_user' (sudo -u)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    SHELL_EXECUTE_SHELL          Shell (overrides config)
    SHELL_EXECUTE_ESCALATION     Escalation style (overrides config)
    SHELL_EXECUTE_KILL_GRACE_MS  Delay between SIGTERM and SIGKILL on timeout
    SHELL_EXECUTE_LOG_LEVEL      Log level (overrides config)
    RUST_LOG                     Alternative log level setting

EXIT STATUS:
    The command's own status, 124 on timeout, 125 if it could not be run.

EXAMPLES:
    shell-execute pwd
    shell-execute -H web1 -u deploy -t 30 --strict 'systemctl restart app'
    echo hello | shell-execute -i - cat -
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("shell-execute {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug, Error)]
pub enum ArgsError {
    /// Lexopt parsing error.
    #[error("{0}")]
    Lexopt(#[from] lexopt::Error),
    /// Invalid argument value.
    #[error("invalid value for --{0}: '{1}'")]
    InvalidValue(&'static str, String),
    /// No command was given.
    #[error("missing command")]
    MissingCommand,
    /// The stdin payload could not be read.
    #[error("failed to read stdin payload: {0}")]
    Stdin(#[from] std::io::Error),
    /// `--options` did not describe a valid request.
    #[error(transparent)]
    Options(#[from] ExecuteError),
}
