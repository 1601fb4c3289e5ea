#![deny(missing_docs)]
#![doc = "Child process execution with output capture, timeouts and cancellation."]

/// Invocation description and process observations.
pub mod invocation;
/// Tokio-backed process runner and the [`Launcher`] seam.
pub mod runner;

pub use invocation::{Invocation, ProcessResult, RunFailure};
pub use runner::{check_executable, Launcher, ProcessRunner};
pub use tokio_util::sync::CancellationToken;
