//! Typed error hierarchy for the remediation pipeline.
//!
//! One enum per subsystem:
//! - `OracleError`: reasoning-oracle failures (always recovered locally)
//! - `PatchError`: patch application failures (retried, then terminal for a file)
//! - `BuildFailure`: a rejected build; the primary signal, not an exception
//! - `RemediationError`: what escapes the orchestrator

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::IsRetryable;

/// Errors from the reasoning oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle process exited with code {exit_code}")]
    ProcessFailed { exit_code: i32 },

    #[error("Oracle returned an empty response")]
    EmptyResponse,

    #[error("Oracle response was malformed: {reason}")]
    Malformed { reason: String },

    #[error("Oracle I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IsRetryable for OracleError {
    fn is_retryable(&self) -> bool {
        matches!(self, OracleError::Malformed { .. } | OracleError::EmptyResponse)
    }
}

/// Errors from applying a candidate patch to the working tree.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("File to patch does not exist: {path}")]
    MissingFile { path: PathBuf },

    #[error("Oracle response is missing <{tag}> delimiters")]
    MissingDelimiter { tag: String },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Gave up patching {path} after {attempts} attempts: {last}")]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        last: Box<PatchError>,
    },
}

impl PatchError {
    /// Whether this failure should abort the whole run rather than just the agent.
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            PatchError::Io { .. } => true,
            PatchError::Exhausted { last, .. } => last.is_unrecoverable(),
            _ => false,
        }
    }
}

impl IsRetryable for PatchError {
    fn is_retryable(&self) -> bool {
        !matches!(self, PatchError::Exhausted { .. })
    }
}

/// A rejected build. `output` is the raw tool output and feeds the next parse.
#[derive(Debug, Clone, Error)]
#[error("Build failed")]
pub struct BuildFailure {
    pub output: String,
}

impl BuildFailure {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Errors that escape `Orchestrator::fix_build_errors`.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Unrecoverable patch failure: {0}")]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
