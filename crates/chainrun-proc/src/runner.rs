use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chainrun_core::errors::{ChainError, ErrorInfo};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::invocation::{Invocation, ProcessResult, RunFailure};

/// Lines of stderr copied into the error context of a failed run.
const STDERR_TAIL_LINES: usize = 20;

/// Something that can run an [`Invocation`] to completion.
///
/// The orchestrator depends on this seam rather than on [`ProcessRunner`]
/// directly so tests can intercept or rewrite launches.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Runs the invocation, honouring its timeout and the cancellation token.
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, RunFailure>;
}

/// Runs child processes with tokio, capturing both output streams.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    drain_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            drain_grace: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Exited,
    TimedOut(Duration),
    Cancelled,
}

impl ProcessRunner {
    /// Creates a runner with the default drain grace period.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds how long captured pipes are drained after a forced kill.
    ///
    /// A killed process can leave descendants holding its pipes open; past the
    /// grace period whatever was not yet read is dropped.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Waits for exit, the timeout or cancellation, whichever comes first.
    /// The status is `None` when the child is still running.
    async fn wait(
        child: &mut Child,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> (Stop, Option<io::Result<ExitStatus>>) {
        let deadline = async {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            status = child.wait() => (Stop::Exited, Some(status)),
            limit = deadline => (Stop::TimedOut(limit), None),
            _ = cancel.cancelled() => (Stop::Cancelled, None),
        }
    }

    async fn collect(&self, task: Option<JoinHandle<String>>, forced: bool) -> String {
        let Some(mut task) = task else {
            return String::new();
        };
        if !forced {
            return (&mut task).await.unwrap_or_default();
        }
        match tokio::time::timeout(self.drain_grace, &mut task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                task.abort();
                String::new()
            }
        }
    }
}

#[async_trait]
impl Launcher for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, RunFailure> {
        // The child runs in its own working directory, so a relative path is
        // pinned to the caller's directory before it is checked and spawned.
        let executable =
            resolve_executable(&invocation.executable).map_err(RunFailure::before_spawn)?;
        let executable = executable.as_path();
        check_executable(executable).map_err(RunFailure::before_spawn)?;
        if cancel.is_cancelled() {
            return Err(RunFailure::before_spawn(ChainError::Cancelled(
                ErrorInfo::new("cancelled_before_start", "run was cancelled before launch")
                    .with_context("executable", executable.display().to_string()),
            )));
        }

        let mut command = Command::new(executable);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|err| {
            RunFailure::before_spawn(ChainError::Launch(
                ErrorInfo::new("launch_spawn", err.to_string())
                    .with_context("executable", executable.display().to_string()),
            ))
        })?;
        let pid = child.id();
        debug!(pid, executable = %executable.display(), args = ?invocation.args, "spawned");

        let stdout_task = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

        let (stop, status) = Self::wait(&mut child, invocation.timeout, cancel).await;
        let forced = stop != Stop::Exited;
        let status = match status {
            Some(status) => status,
            None => {
                warn!(pid, ?stop, "terminating child");
                // The child may have exited on its own in the meantime; it is reaped either way.
                let _ = child.start_kill();
                child.wait().await
            }
        };

        let stdout = self.collect(stdout_task, forced).await;
        let stderr = self.collect(stderr_task, forced).await;
        let duration = started.elapsed();

        let mut process = ProcessResult {
            pid,
            exit_code: None,
            signal: None,
            stdout,
            stderr,
            duration,
        };
        let status = match status {
            Ok(status) => status,
            Err(err) => {
                return Err(RunFailure::after_spawn(
                    ChainError::Runtime(
                        ErrorInfo::new("process_wait", err.to_string())
                            .with_context("executable", executable.display().to_string()),
                    ),
                    process,
                ))
            }
        };
        process.exit_code = status.code();
        process.signal = exit_signal(&status);
        debug!(pid, exit_code = process.exit_code, signal = process.signal, ?duration, "reaped");

        let context = |info: ErrorInfo| {
            info.with_context("executable", executable.display().to_string())
                .with_context("elapsed_ms", duration.as_millis().to_string())
        };
        match stop {
            Stop::TimedOut(limit) => Err(RunFailure::after_spawn(
                ChainError::Timeout(context(
                    ErrorInfo::new("process_timeout", "process exceeded its time limit")
                        .with_context("timeout_ms", limit.as_millis().to_string()),
                )),
                process,
            )),
            Stop::Cancelled => Err(RunFailure::after_spawn(
                ChainError::Cancelled(context(ErrorInfo::new(
                    "process_cancelled",
                    "process was terminated because the run was cancelled",
                ))),
                process,
            )),
            Stop::Exited if status.success() => Ok(process),
            Stop::Exited => {
                let mut info = ErrorInfo::new("process_failed", "process exited unsuccessfully");
                if let Some(code) = process.exit_code {
                    info = info.with_context("exit_code", code.to_string());
                }
                if let Some(signal) = process.signal {
                    info = info.with_context("signal", signal.to_string());
                }
                let tail = stderr_tail(&process.stderr);
                if !tail.is_empty() {
                    info = info.with_context("stderr", tail);
                }
                Err(RunFailure::after_spawn(ChainError::Runtime(context(info)), process))
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut buf = Vec::new();
    // A read error keeps whatever arrived before it.
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn resolve_executable(path: &Path) -> Result<PathBuf, ChainError> {
    std::path::absolute(path).map_err(|err| {
        ChainError::Launch(
            ErrorInfo::new("launch_resolve", err.to_string())
                .with_context("executable", path.display().to_string()),
        )
    })
}

/// Verifies that `path` names an existing, runnable regular file.
pub fn check_executable(path: &Path) -> Result<(), ChainError> {
    let launch = |code: &str, message: &str| {
        ChainError::Launch(
            ErrorInfo::new(code, message).with_context("executable", path.display().to_string()),
        )
    };
    let metadata = fs::metadata(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => launch("launch_missing", "executable does not exist"),
        _ => launch("launch_stat", &err.to_string()),
    })?;
    if !metadata.is_file() {
        return Err(launch("launch_not_file", "executable path is not a regular file"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ChainError::Launch(
                ErrorInfo::new("launch_not_executable", "executable lacks execute permission")
                    .with_context("executable", path.display().to_string())
                    .with_hint("chmod +x the compiled model"),
            ));
        }
    }
    Ok(())
}
