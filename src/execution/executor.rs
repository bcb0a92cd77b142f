//! Command execution engine.

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, info, warn};

use super::command::{AcceptedStatus, Request, RunOptions};
use super::governor::{Bounded, TimeoutGovernor, DEFAULT_KILL_GRACE};
use super::invoker::{CapturedOutput, ProcessInvoker, DEFAULT_SHELL};
use super::result::{InvocationResult, ProcessOutput};
use super::transform::{self, Escalation};
use crate::error::ExecuteError;
use crate::Result;

/// Settings chosen once per executor instead of per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Shell that interprets the final command string.
    pub shell: PathBuf,
    /// How to become another user.
    pub escalation: Escalation,
    /// Pause between SIGTERM and SIGKILL when a time limit passes.
    pub kill_grace: Duration,
    /// Time limit for requests that don't carry their own.
    pub default_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            escalation: Escalation::default(),
            kill_grace: DEFAULT_KILL_GRACE,
            default_timeout: None,
        }
    }
}

/// Runs requests and reduces them to results.
#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
    invoker: ProcessInvoker,
    governor: TimeoutGovernor,
}

impl Executor {
    /// Create a new executor.
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            invoker: ProcessInvoker::new(config.shell.clone()),
            governor: TimeoutGovernor::new(config.kill_grace),
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The exact string handed to the shell for `request`.
    pub fn transformed_command(&self, request: &Request) -> String {
        transform::transform(
            request.command(),
            request.user(),
            request.host(),
            self.config.escalation,
        )
    }

    /// Run a request and return its result whatever the exit status.
    ///
    /// Only request-shape problems, launch failures, and timeouts are errors.
    /// `status` and `emsg` belong to [`Executor::run_or_fail`] and are
    /// rejected here rather than ignored.
    pub fn run(&self, request: &Request) -> Result<InvocationResult> {
        if request.status().is_some() || request.emsg().is_some() {
            return Err(ExecuteError::InvalidRequest(
                "`status` and `emsg` only apply to run_or_fail".into(),
            ));
        }
        self.invoke(request)
    }

    /// Run a request and fail unless its exit status is accepted.
    ///
    /// Accepts status 0 unless the request says otherwise. The failure
    /// message is the request's `emsg` (or the command text) followed by the
    /// captured stderr; the full result travels with the error.
    pub fn run_or_fail(&self, request: &Request) -> Result<InvocationResult> {
        let accepted = request.status().cloned().unwrap_or_default();
        let result = self.invoke(request)?;
        check_status(request, &accepted, result)
    }

    /// Async wrapper around [`Executor::run`] on tokio's blocking pool.
    pub async fn run_async(&self, request: Request) -> Result<InvocationResult> {
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.run(&request))
            .await
            .map_err(|e| ExecuteError::Io(io::Error::other(e)))?
    }

    /// Async wrapper around [`Executor::run_or_fail`] on tokio's blocking pool.
    pub async fn run_or_fail_async(&self, request: Request) -> Result<InvocationResult> {
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.run_or_fail(&request))
            .await
            .map_err(|e| ExecuteError::Io(io::Error::other(e)))?
    }

    fn invoke(&self, request: &Request) -> Result<InvocationResult> {
        let span = debug_span!("execute", command = %request.command());
        let _enter = span.enter();

        debug!(state = "transforming");
        let command = self.transformed_command(request);
        if request.debug() {
            info!(%command, "running");
        } else {
            debug!(%command, "running");
        }

        let limit = request.timeout().or(self.config.default_timeout);
        if limit == Some(Duration::ZERO) {
            warn!("time limit already expired, not starting");
            return Err(ExecuteError::Timeout {
                limit: Duration::ZERO,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        debug!(state = "invoking", ?limit);
        let start = Instant::now();
        let process = self.invoker.spawn(&command, request.stdin())?;
        let terminator = process.terminator();
        let captured = process.captured();
        let outcome = self
            .governor
            .bounded_run(limit, &terminator, move || process.wait())?;

        match outcome {
            Bounded::Completed(output) => {
                let output = output?;
                debug!(state = "completed", status = output.exit_status);
                Ok(InvocationResult::new(
                    output.exit_status,
                    output.stdout,
                    output.stderr,
                    start.elapsed(),
                ))
            }
            Bounded::Expired { late } => {
                debug!(state = "timed_out");
                let (stdout, stderr) = partial_output(late, &captured);
                Err(ExecuteError::Timeout {
                    limit: limit.unwrap_or_default(),
                    stdout,
                    stderr,
                })
            }
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

/// Output to attach to a timeout error.
fn partial_output(
    late: Option<io::Result<ProcessOutput>>,
    captured: &CapturedOutput,
) -> (Vec<u8>, Vec<u8>) {
    match late {
        Some(Ok(output)) => (output.stdout, output.stderr),
        Some(Err(e)) => {
            warn!(error = %e, "I/O failure while collecting terminated process");
            captured.snapshot()
        }
        // a pipe is still held open outside the process group
        None => captured.snapshot(),
    }
}

fn check_status(
    request: &Request,
    accepted: &AcceptedStatus,
    result: InvocationResult,
) -> Result<InvocationResult> {
    if accepted.accepts(result.exit_status) {
        return Ok(result);
    }

    let template = request.emsg().unwrap_or(request.command());
    let message = format!("{template}\n{}\n", result.stderr_str());
    debug!(status = result.exit_status, ?accepted, "exit status not accepted");
    Err(ExecuteError::StatusMismatch {
        message,
        status: result.exit_status,
        result: Box::new(result),
    })
}

/// Run a request with a default executor.
pub fn run(request: &Request) -> Result<InvocationResult> {
    Executor::default().run(request)
}

/// Run a request with a default executor, failing on unaccepted status.
pub fn run_or_fail(request: &Request) -> Result<InvocationResult> {
    Executor::default().run_or_fail(request)
}

/// Run `command` with a loosely typed option map.
pub fn run_command(command: &str, options: &RunOptions) -> Result<InvocationResult> {
    run(&options.to_request(command)?)
}

/// Run `command` with a loosely typed option map, failing on unaccepted
/// status.
pub fn run_command_or_fail(command: &str, options: &RunOptions) -> Result<InvocationResult> {
    run_or_fail(&options.to_request(command)?)
}
