//! Error types for shell-execute.

use std::time::Duration;

use thiserror::Error;

use crate::execution::InvocationResult;

/// Main error type for shell-execute operations.
#[derive(Error, Debug)]
pub enum ExecuteError {
    /// The request was malformed; no process was started.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The shell could not be started or its stdio could not be set up.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish within its time limit.
    ///
    /// Whatever the command wrote before it was terminated is attached.
    #[error("command timed out after {limit:?}")]
    Timeout {
        limit: Duration,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    /// Exit status not in the accepted set (strict entry point only).
    #[error("{message}")]
    StatusMismatch {
        message: String,
        status: i32,
        result: Box<InvocationResult>,
    },

    /// I/O error while driving an already started process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecuteError {
    /// Captured stderr attached to this error, if any.
    pub fn stderr(&self) -> Option<&[u8]> {
        match self {
            Self::Timeout { stderr, .. } => Some(stderr),
            Self::StatusMismatch { result, .. } => Some(&result.stderr),
            _ => None,
        }
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Convenience Result type for shell-execute operations.
pub type Result<T> = std::result::Result<T, ExecuteError>;
