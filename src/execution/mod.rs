//! Command execution pipeline.
//!
//! A request flows through four stages:
//! - user and host switching rewrite the command string
//! - the invoker launches it through the shell and captures its output
//! - the governor bounds the wait and terminates the process on expiry
//! - the executor reduces the outcome to a result or an error
//!
//! # Example
//!
//! ```no_run
//! use shell_execute::execution::{run, run_or_fail, Request};
//! use std::time::Duration;
//!
//! // Lenient: a failing command is still a result
//! let result = run(&Request::new("false").unwrap()).unwrap();
//! assert_ne!(result.exit_status, 0);
//!
//! // Strict, remote, as another user, with a time limit
//! let request = Request::builder("systemctl restart app")
//!     .host("web1.example.com")
//!     .user("deploy")
//!     .timeout(Duration::from_secs(30))
//!     .build()
//!     .unwrap();
//! run_or_fail(&request).unwrap();
//! ```

mod command;
mod executor;
mod governor;
mod invoker;
mod result;
pub mod transform;

pub use command::{timeout_from_secs, AcceptedStatus, Request, RequestBuilder, RunOptions};
pub use executor::{
    run, run_command, run_command_or_fail, run_or_fail, Executor, ExecutorConfig,
};
pub use governor::{Bounded, Terminate, Termination, TimeoutGovernor, DEFAULT_KILL_GRACE};
pub use invoker::{
    exit_code, CapturedOutput, ProcessInvoker, ProcessTerminator, RunningProcess, DEFAULT_SHELL,
};
pub use result::{InvocationResult, ProcessOutput};
pub use transform::{apply_host, apply_user, escape_double_quoted, Escalation};
