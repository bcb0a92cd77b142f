//! Wall-clock bounds for blocking operations.
//!
//! The operation runs on a dedicated thread while the caller waits on a
//! channel with a hard deadline, so the bound holds even when the operation
//! is stuck in a blocking system call such as `waitpid`.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Default pause between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// How hard to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ask the operation to stop (SIGTERM).
    Graceful,
    /// Stop it unconditionally (SIGKILL).
    Forced,
}

/// Something that can stop a running operation from another thread.
pub trait Terminate {
    fn terminate(&self, how: Termination) -> io::Result<()>;
}

/// Outcome of a bounded operation.
#[derive(Debug)]
pub enum Bounded<T> {
    /// Finished within the limit.
    Completed(T),
    /// The limit passed first. `late` holds what the operation returned
    /// after it was terminated, if it returned at all.
    Expired { late: Option<T> },
}

/// Enforces time limits with SIGTERM, a grace period, then SIGKILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutGovernor {
    grace: Duration,
}

impl TimeoutGovernor {
    /// Create a governor that waits `grace` between the polite and the
    /// forced termination.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Run `operation`, bounded by `limit`.
    ///
    /// With no limit the operation runs inline. A zero limit is already
    /// expired: `terminator` fires before the operation starts, the result is
    /// never reported as completed, and the wait for it is bounded just like
    /// the wait after a SIGKILL.
    ///
    /// Fails only if the worker thread cannot be started or dies without
    /// reporting back.
    pub fn bounded_run<T, F>(
        &self,
        limit: Option<Duration>,
        terminator: &dyn Terminate,
        operation: F,
    ) -> io::Result<Bounded<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let Some(limit) = limit else {
            return Ok(Bounded::Completed(operation()));
        };

        if limit.is_zero() {
            debug!("zero time limit, terminating before start");
            signal(terminator, Termination::Forced);
        }

        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("exec-governor".into())
            .spawn(move || {
                // receiver may have given up already
                let _ = tx.send(operation());
            });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                signal(terminator, Termination::Forced);
                return Err(e);
            }
        };

        if limit.is_zero() {
            let late = rx.recv_timeout(self.reap_wait()).ok();
            return Ok(Bounded::Expired {
                late: settle(worker, late),
            });
        }

        match rx.recv_timeout(limit) {
            Ok(value) => {
                let _ = worker.join();
                Ok(Bounded::Completed(value))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?limit, "time limit exceeded, terminating");
                let late = self.escalate(terminator, &rx);
                Ok(Bounded::Expired {
                    late: settle(worker, late),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                Err(io::Error::other("bounded operation terminated unexpectedly"))
            }
        }
    }

    /// SIGTERM, wait out the grace period, SIGKILL, wait once more.
    fn escalate<T>(&self, terminator: &dyn Terminate, rx: &mpsc::Receiver<T>) -> Option<T> {
        signal(terminator, Termination::Graceful);
        match rx.recv_timeout(self.grace) {
            Ok(value) => return Some(value),
            Err(RecvTimeoutError::Disconnected) => return None,
            Err(RecvTimeoutError::Timeout) => {}
        }

        debug!(grace = ?self.grace, "grace period over");
        signal(terminator, Termination::Forced);
        rx.recv_timeout(self.reap_wait()).ok()
    }

    /// How long to wait for the operation after a SIGKILL.
    fn reap_wait(&self) -> Duration {
        self.grace.max(DEFAULT_KILL_GRACE)
    }
}

/// Join the worker if it reported back; otherwise leave it detached.
fn settle<T>(worker: thread::JoinHandle<()>, late: Option<T>) -> Option<T> {
    if late.is_some() {
        let _ = worker.join();
    } else {
        warn!("operation did not stop after SIGKILL, abandoning wait");
    }
    late
}

impl Default for TimeoutGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_GRACE)
    }
}

fn signal(terminator: &dyn Terminate, how: Termination) {
    if let Err(e) = terminator.terminate(how) {
        warn!(?how, error = %e, "failed to terminate");
    }
}
