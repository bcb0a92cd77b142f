//! Execution result types.

use std::time::Duration;

/// Normalized outcome of one command execution.
///
/// Status and both captured streams are always populated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    /// Exit status of the process. Signal terminations are reported as
    /// `128 + signal`, the way shells report them.
    pub exit_status: i32,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
    /// Wall-clock time from launch to exit.
    pub duration: Duration,
}

impl InvocationResult {
    /// Create a new invocation result.
    pub fn new(exit_status: i32, stdout: Vec<u8>, stderr: Vec<u8>, duration: Duration) -> Self {
        Self {
            exit_status,
            stdout,
            stderr,
            duration,
        }
    }

    /// Check if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Standard output as text (lossy UTF-8).
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error as text (lossy UTF-8).
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Get stdout as text, trimmed.
    pub fn stdout_trimmed(&self) -> String {
        self.stdout_str().trim().to_string()
    }
}

/// Raw output of a finished process, before reduction.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub exit_status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}
