// src/errors.rs

//! Crate-wide error types.
//!
//! [`RunError`] is the outcome of `run` / `abort` on the engine and is
//! cloneable so the same failure can resolve both a run and the abort that
//! ended it. [`BatchrunError`] wraps it together with configuration and IO
//! failures for the rest of the crate.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::RunningTask;

#[derive(Error, Debug)]
pub enum BatchrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BatchrunError>;

/// Requests refused up front, without touching any engine state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageError {
    #[error("already running")]
    AlreadyRunning,

    #[error("no task to run")]
    NoTaskToRun,

    #[error("not running")]
    NotRunning,

    #[error("abort already in progress")]
    AbortInProgress,
}

/// What started the abort protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbortCause {
    /// The run's overall timeout elapsed.
    Timeout,
    /// A caller asked for the abort.
    Requested,
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::Timeout => f.write_str("run timeout elapsed"),
            AbortCause::Requested => f.write_str("abort requested"),
        }
    }
}

/// Failure outcome of a run (or of an abort request).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RunError {
    #[error("{reason}")]
    Usage { reason: UsageError },

    /// The run was aborted and every process was stopped.
    #[error("aborted ({cause})")]
    Aborted { cause: AbortCause },

    /// The abort protocol gave up; the listed processes were forgotten while
    /// possibly still alive.
    #[error(
        "unable to abort all tasks/processes after {attempts} tries. still running tasks: {}",
        list_running(.still_running)
    )]
    AbortFailed {
        attempts: u32,
        still_running: Vec<RunningTask>,
    },

    /// The engine task is gone.
    #[error("task runner has shut down")]
    Shutdown,
}

impl From<UsageError> for RunError {
    fn from(reason: UsageError) -> Self {
        RunError::Usage { reason }
    }
}

impl RunError {
    /// Whether this outcome comes from the abort protocol (successful or not).
    pub fn is_abort(&self) -> bool {
        matches!(self, RunError::Aborted { .. } | RunError::AbortFailed { .. })
    }
}

fn list_running(tasks: &[RunningTask]) -> String {
    let items: Vec<String> = tasks.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// A task's standard input could not be read.
///
/// The process it was meant to feed is killed and the task completes with
/// this error in its [`ExecutionResult`](crate::types::ExecutionResult).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("error {operation} {input}: {message}")]
pub struct InputAcquisitionError {
    /// Path of the input file.
    pub input: String,
    /// `open` or `read`.
    pub operation: String,
    pub message: String,
}
