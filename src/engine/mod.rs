// src/engine/mod.rs

//! Orchestration engine for batchrun.
//!
//! This module ties together:
//! - the pending task queue
//! - the process tracker (what is running right now)
//! - the timers driving the health check, the run timeout and abort retries
//! - the main runtime event loop that reacts to:
//!   - process exits reported by the backend
//!   - timer ticks
//!   - requests from [`TasksRunner`](crate::runner::TasksRunner) handles
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use serde::Serialize;

use crate::errors::{BatchrunError, Result, RunError};
use crate::types::{
    serialize_millis, ExecutionResult, ProcessHandle, Progress, QueuedItem, RunningTask, Task,
    TaskId,
};

/// How often running processes are checked against the execution ceiling.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Pause between kill attempts while aborting.
pub const ABORT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Kill attempts made before an abort is declared failed.
pub const MAX_KILL_ATTEMPTS: u32 = 3;

/// The engine's timers. At most one of each kind is armed at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Periodic check for processes exceeding the execution ceiling.
    HealthCheck,
    /// One-shot overall deadline of a run.
    RunTimeout,
    /// Periodic kill retry while aborting.
    AbortRetry,
}

/// Events flowing into the runtime from process backends and timers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A process launched through the backend has exited.
    ProcessExited {
        handle: ProcessHandle,
        result: ExecutionResult,
    },
    /// An armed timer fired. `generation` identifies which arming of the
    /// timer produced the tick so stale ticks can be dropped.
    TimerFired { timer: TimerKind, generation: u64 },
}

/// Notifications published to subscribers while a run is in progress.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RunnerEvent {
    /// Counters after a completion.
    Progress(Progress),
    /// One task has finished (successfully or not).
    TaskComplete {
        id: TaskId,
        task: Task,
        handle: ProcessHandle,
        result: ExecutionResult,
        #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
        duration: Duration,
    },
    /// Every task of the run has completed.
    Finish,
    /// These processes are about to be killed, either for exceeding the
    /// execution ceiling or as part of an abort.
    KillingTasks { tasks: Vec<RunningTask> },
    /// The abort protocol has started.
    Aborting,
    /// The abort protocol gave up.
    AbortFailed { error: RunError },
    /// The abort protocol finished with every process gone.
    Aborted,
}

/// Engine configuration fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Upper bound on simultaneously live processes.
    pub max_concurrent: usize,
    /// Per-process execution ceiling; `None` disables the health check.
    pub max_task_execution: Option<Duration>,
}

impl RunnerOptions {
    /// Validate and build options. A zero ceiling means "no ceiling".
    pub fn new(max_concurrent: usize, max_task_execution: Option<Duration>) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(BatchrunError::ConfigError(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            max_concurrent,
            max_task_execution: max_task_execution.filter(|d| !d.is_zero()),
        })
    }
}

/// Cheap status published after every engine step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunnerStatus {
    pub running: bool,
    pub total_tasks: usize,
    pub tasks_completed: usize,
}

/// Full export of engine state.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerSnapshot {
    pub running: bool,
    pub total_tasks: usize,
    pub tasks_completed: usize,
    /// Pending items, front first.
    pub queue: Vec<QueuedItem>,
    /// Live processes keyed by handle.
    pub running_processes: std::collections::BTreeMap<ProcessHandle, tracker::TrackedProcess>,
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;
pub mod timers;
pub mod tracker;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep, TimerSchedule};
pub use queue::TaskQueue;
pub use runtime::{Runtime, RunnerCommand};
pub use tracker::ProcessTracker;
