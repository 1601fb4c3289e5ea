use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chainrun_core::errors::ChainError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything needed to start one child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Path of the executable to run.
    pub executable: PathBuf,
    /// Arguments passed verbatim, in order.
    pub args: Vec<String>,
    /// Working directory; inherits the caller's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Wall-clock limit after which the process is killed.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Creates an invocation with no arguments, environment or timeout.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the wall-clock limit.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Observed facts about a child process that was actually spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// OS process id, when the platform reported one.
    pub pid: Option<u32>,
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal number (unix only).
    pub signal: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock time from spawn to reap.
    pub duration: Duration,
}

impl ProcessResult {
    /// True when the process exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A failed run: the error plus whatever was observed before it happened.
///
/// `process` is `None` only when nothing was spawned (a launch failure).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct RunFailure {
    /// Classified error.
    pub error: ChainError,
    /// Partial process observations, when a process existed.
    pub process: Option<ProcessResult>,
}

impl RunFailure {
    /// Failure before any process existed.
    pub fn before_spawn(error: ChainError) -> Self {
        Self {
            error,
            process: None,
        }
    }

    /// Failure of a process that was spawned and reaped.
    pub fn after_spawn(error: ChainError, process: ProcessResult) -> Self {
        Self {
            error,
            process: Some(process),
        }
    }
}
