//! Structured error types shared across chainrun crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`ChainError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, chain ids, line numbers, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for chainrun.
///
/// `InvalidArgument`, `MalformedData` and `Orchestration` abort a whole
/// `sample` call. Every other family is recorded against a single chain and
/// never affects its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum ChainError {
    /// Malformed call-site parameters or configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(ErrorInfo),
    /// Input data failed validation or serialization.
    #[error("malformed data: {0}")]
    MalformedData(ErrorInfo),
    /// Executable missing, not runnable, or the spawn failed.
    #[error("launch error: {0}")]
    Launch(ErrorInfo),
    /// Child process exited unsuccessfully.
    #[error("runtime failure: {0}")]
    Runtime(ErrorInfo),
    /// Child process exceeded its wall-clock limit and was terminated.
    #[error("timeout: {0}")]
    Timeout(ErrorInfo),
    /// Chain was aborted because the whole run was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(ErrorInfo),
    /// Output artifact was missing, truncated or unparsable.
    #[error("malformed output: {0}")]
    MalformedOutput(ErrorInfo),
    /// Failure in the orchestration layer itself.
    #[error("orchestration error: {0}")]
    Orchestration(ErrorInfo),
}

/// Discriminant of [`ChainError`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// See [`ChainError::InvalidArgument`].
    InvalidArgument,
    /// See [`ChainError::MalformedData`].
    MalformedData,
    /// See [`ChainError::Launch`].
    Launch,
    /// See [`ChainError::Runtime`].
    Runtime,
    /// See [`ChainError::Timeout`].
    Timeout,
    /// See [`ChainError::Cancelled`].
    Cancelled,
    /// See [`ChainError::MalformedOutput`].
    MalformedOutput,
    /// See [`ChainError::Orchestration`].
    Orchestration,
}

impl ChainError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            ChainError::InvalidArgument(info)
            | ChainError::MalformedData(info)
            | ChainError::Launch(info)
            | ChainError::Runtime(info)
            | ChainError::Timeout(info)
            | ChainError::Cancelled(info)
            | ChainError::MalformedOutput(info)
            | ChainError::Orchestration(info) => info,
        }
    }

    /// Returns the payload-free discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ChainError::MalformedData(_) => ErrorKind::MalformedData,
            ChainError::Launch(_) => ErrorKind::Launch,
            ChainError::Runtime(_) => ErrorKind::Runtime,
            ChainError::Timeout(_) => ErrorKind::Timeout,
            ChainError::Cancelled(_) => ErrorKind::Cancelled,
            ChainError::MalformedOutput(_) => ErrorKind::MalformedOutput,
            ChainError::Orchestration(_) => ErrorKind::Orchestration,
        }
    }

    /// True for errors that belong to one chain rather than the whole call.
    pub fn is_chain_level(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Launch
                | ErrorKind::Runtime
                | ErrorKind::Timeout
                | ErrorKind::Cancelled
                | ErrorKind::MalformedOutput
        )
    }

    /// Shorthand for an [`ChainError::Orchestration`] wrapping a lower level error.
    pub fn orchestration(code: &str, err: impl ToString) -> Self {
        ChainError::Orchestration(ErrorInfo::new(code, err.to_string()))
    }
}
