// src/types.rs

//! Data contracts shared by the queue, the process tracker, the engine and
//! the process backends.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::errors::InputAcquisitionError;

/// Run-scoped sequence id assigned to a task when it is enqueued.
pub type TaskId = u64;

/// Where a task's standard input comes from.
///
/// In its textual form (command files, JSON) a value starting with `@` is a
/// file path and anything else is passed through literally:
///
/// ```text
/// stdin = "@data/input.csv"   # streamed from a file
/// stdin = "hello\n"           # written as-is
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StdinSource {
    Literal(String),
    File(PathBuf),
}

impl StdinSource {
    /// An empty literal means "no input" and the process gets a null stdin.
    pub fn is_empty(&self) -> bool {
        matches!(self, StdinSource::Literal(text) if text.is_empty())
    }
}

impl From<String> for StdinSource {
    fn from(value: String) -> Self {
        match value.strip_prefix('@') {
            Some(path) => StdinSource::File(PathBuf::from(path)),
            None => StdinSource::Literal(value),
        }
    }
}

impl From<&str> for StdinSource {
    fn from(value: &str) -> Self {
        StdinSource::from(value.to_string())
    }
}

impl From<StdinSource> for String {
    fn from(source: StdinSource) -> Self {
        match source {
            StdinSource::Literal(text) => text,
            StdinSource::File(path) => format!("@{}", path.display()),
        }
    }
}

/// One unit of work: a shell command plus optional environment overrides,
/// standard input and caller-owned tags.
///
/// The engine never mutates a task; it only forwards it to the backend and
/// back out in events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Command line, run through the platform shell.
    pub cmd: String,

    /// Environment variables set on top of the inherited environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<StdinSource>,

    /// Free-form bookkeeping for the caller; ignored by the engine.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            env: BTreeMap::new(),
            stdin: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<StdinSource>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Input to feed the process, if any. Empty literals count as none.
    pub fn input(&self) -> Option<&StdinSource> {
        self.stdin.as_ref().filter(|source| !source.is_empty())
    }
}

/// A task waiting in the queue together with its sequence id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedItem {
    pub id: TaskId,
    pub task: Task,
}

/// Opaque identifier of a live process, handed out by the process backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProcessHandle(pub u64);

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// (id, handle) pair describing one in-flight process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunningTask {
    pub id: TaskId,
    pub handle: ProcessHandle,
}

impl fmt::Display for RunningTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} (handle {})", self.id, self.handle)
    }
}

/// One of the captured output streams of a task process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturedStream {
    Stdout,
    Stderr,
}

impl fmt::Display for CapturedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedStream::Stdout => f.write_str("stdout"),
            CapturedStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// What a process backend reports once a process has exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Exit code, or `None` when the process was terminated by a signal or
    /// never started.
    pub exit_code: Option<i32>,

    /// Terminating signal (unix only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    pub stdout: Option<String>,

    /// Captured stderr; falls back to the input error description when the
    /// process wrote nothing to stderr.
    pub stderr: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_error: Option<InputAcquisitionError>,

    /// Stream that went over the capture limit; the process was killed and
    /// the captured text is cut at the limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_overflow: Option<CapturedStream>,
}

impl ExecutionResult {
    /// Normal exit with the given code and no captured output.
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            signal: None,
            stdout: None,
            stderr: None,
            input_error: None,
            output_overflow: None,
        }
    }

    /// Termination by a signal.
    pub fn killed(signal: Option<i32>) -> Self {
        Self {
            exit_code: None,
            signal,
            stdout: None,
            stderr: None,
            input_error: None,
            output_overflow: None,
        }
    }

    /// The process could not be started or supervised at all.
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            signal: None,
            stdout: None,
            stderr: Some(message.into()),
            input_error: None,
            output_overflow: None,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && self.input_error.is_none() && self.output_overflow.is_none()
    }
}

/// Run progress derived from the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    /// `completed * 100 / total`, absent when `total` is zero.
    pub percent_completed: Option<f64>,
}

impl Progress {
    pub fn new(total: usize, completed: usize) -> Self {
        let percent_completed = if total == 0 {
            None
        } else {
            Some(completed as f64 * 100.0 / total as f64)
        };
        Self {
            total,
            completed,
            percent_completed,
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serialize a [`Duration`] as whole milliseconds.
pub(crate) fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration_millis(*duration))
}
