//! Process launching and output capture.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use super::governor::{Terminate, Termination};
use super::result::ProcessOutput;
use crate::error::ExecuteError;
use crate::Result;

/// Default shell used to interpret command strings.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Launches one shell process per command.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    shell: PathBuf,
}

impl ProcessInvoker {
    /// Create an invoker that runs commands through `shell -c`.
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Launch `command` and start feeding and draining its stdio.
    ///
    /// The child gets its own process group so that a timeout can take down
    /// everything it started. stdin is `/dev/null` when no payload is given.
    pub fn spawn(&self, command: &str, stdin: Option<&[u8]>) -> Result<RunningProcess> {
        let launch_error = |source: io::Error| ExecuteError::Launch {
            command: command.to_string(),
            source,
        };

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(launch_error)?;
        debug!(pid = child.id(), shell = %self.shell.display(), "process spawned");

        let captured = CapturedOutput::default();
        match Self::attach(&mut child, stdin, &captured) {
            Ok((stdin_writer, stdout_reader, stderr_reader)) => Ok(RunningProcess {
                child,
                captured,
                stdin_writer,
                stdout_reader,
                stderr_reader,
            }),
            Err(e) => {
                // never leave a half-wired child behind
                let _ = child.kill();
                let _ = child.wait();
                Err(launch_error(e))
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn attach(
        child: &mut Child,
        stdin: Option<&[u8]>,
        captured: &CapturedOutput,
    ) -> io::Result<(
        Option<JoinHandle<io::Result<()>>>,
        JoinHandle<io::Result<()>>,
        JoinHandle<io::Result<()>>,
    )> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not captured"))?;

        let stdin_writer = match stdin {
            Some(payload) => {
                let pipe = child
                    .stdin
                    .take()
                    .ok_or_else(|| io::Error::other("stdin was not captured"))?;
                Some(feed(pipe, payload.to_vec())?)
            }
            None => None,
        };

        Ok((
            stdin_writer,
            drain(stdout, Arc::clone(&captured.stdout), "exec-stdout")?,
            drain(stderr, Arc::clone(&captured.stderr), "exec-stderr")?,
        ))
    }
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

/// Write `payload` to the child's stdin, then close it.
fn feed(mut pipe: ChildStdin, payload: Vec<u8>) -> io::Result<JoinHandle<io::Result<()>>> {
    thread::Builder::new()
        .name("exec-stdin".into())
        .spawn(move || {
            match pipe.write_all(&payload) {
                // the command exited without reading all of its input
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
            // dropping the pipe closes the child's stdin
        })
}

/// Read a stream to EOF on its own thread, appending into `sink` as data
/// arrives so a snapshot is possible at any time.
fn drain<R>(
    mut pipe: R,
    sink: Arc<Mutex<Vec<u8>>>,
    name: &str,
) -> io::Result<JoinHandle<io::Result<()>>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    })
}

fn lock(buf: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    // a reader that panicked mid-append still leaves valid bytes behind
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Output captured so far, shared with the reader threads.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Copy of everything read from stdout and stderr up to now.
    pub fn snapshot(&self) -> (Vec<u8>, Vec<u8>) {
        (lock(&self.stdout).clone(), lock(&self.stderr).clone())
    }

    fn take(&self) -> (Vec<u8>, Vec<u8>) {
        (
            std::mem::take(&mut *lock(&self.stdout)),
            std::mem::take(&mut *lock(&self.stderr)),
        )
    }
}

fn join<T>(handle: JoinHandle<io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .map_err(|_| io::Error::other("I/O thread panicked"))?
}

/// A launched process whose stdio is being pumped.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    captured: CapturedOutput,
    stdin_writer: Option<JoinHandle<io::Result<()>>>,
    stdout_reader: JoinHandle<io::Result<()>>,
    stderr_reader: JoinHandle<io::Result<()>>,
}

impl RunningProcess {
    /// OS process ID, which is also the child's process group ID.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Handle that can signal this process group from another thread.
    pub fn terminator(&self) -> ProcessTerminator {
        ProcessTerminator::new(self.id())
    }

    /// Shared view of the output read so far; stays valid after the process
    /// has been moved into another thread.
    pub fn captured(&self) -> CapturedOutput {
        self.captured.clone()
    }

    /// Wait for the process to finish.
    ///
    /// The child is reaped first, then stdin is fully written and both output
    /// streams are drained before the result is returned. A descendant that
    /// keeps a pipe open delays the return but not the reaping.
    pub fn wait(mut self) -> io::Result<ProcessOutput> {
        let status = self.child.wait();
        let written = self.stdin_writer.take().map(join).transpose();
        let stdout = join(self.stdout_reader);
        let stderr = join(self.stderr_reader);

        let status = status?;
        written?;
        stdout?;
        stderr?;
        let (stdout, stderr) = self.captured.take();
        let output = ProcessOutput {
            exit_status: exit_code(status),
            stdout,
            stderr,
        };
        trace!(
            status = output.exit_status,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "process reaped"
        );
        Ok(output)
    }
}

/// Map an exit status to a single integer.
///
/// Signal deaths become `128 + signal`, as a shell would report them.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Signals a child's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTerminator {
    pgid: u32,
}

impl ProcessTerminator {
    pub fn new(pgid: u32) -> Self {
        Self { pgid }
    }
}

impl Terminate for ProcessTerminator {
    #[cfg(unix)]
    fn terminate(&self, how: Termination) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let signal = match how {
            Termination::Graceful => Signal::SIGTERM,
            Termination::Forced => Signal::SIGKILL,
        };
        debug!(pgid = self.pgid, ?signal, "signalling process group");

        match killpg(Pid::from_raw(self.pgid as i32), signal) {
            // already gone
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, _how: Termination) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process group termination requires a unix host",
        ))
    }
}
