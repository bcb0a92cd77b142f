//! # shell-execute
//!
//! Run one shell command, optionally as another user and on another host,
//! with a time limit and exit-status checking.
//!
//! ## Features
//!
//! - **User switching**: `sudo su -lc` login sessions (or `sudo -u`)
//! - **Host switching**: non-interactive `ssh` with fixed connection flags
//! - **Time limits**: hard wall-clock deadline, process group terminated on expiry
//! - **Two entry points**: lenient [`run`] never fails on exit status,
//!   strict [`run_or_fail`] checks it against an accepted set
//!
//! ## Quick Start
//!
//! ```no_run
//! use shell_execute::{run, run_or_fail, Request};
//!
//! fn main() -> shell_execute::Result<()> {
//!     shell_execute::logging::try_init().ok();
//!
//!     let result = run(&Request::new("pwd")?)?;
//!     println!("{} -> {}", result.exit_status, result.stdout_trimmed());
//!
//!     let request = Request::builder("cat -").stdin("hello").build()?;
//!     assert_eq!(run_or_fail(&request)?.stdout, b"hello");
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;

// Re-export commonly used types
pub use error::{ExecuteError, Result};
pub use execution::{
    run, run_command, run_command_or_fail, run_or_fail, AcceptedStatus, Escalation, Executor,
    ExecutorConfig, InvocationResult, Request, RunOptions,
};
