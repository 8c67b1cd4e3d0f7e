// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and caller requests and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - launching and killing processes through the backend
//! - arming and cancelling timers
//! - delivering notifications and resolving callers
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes. Time is always passed in.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::engine::event_handlers::{CoreCommand, CoreStep, TimerSchedule};
use crate::engine::queue::TaskQueue;
use crate::engine::tracker::ProcessTracker;
use crate::engine::{
    HEALTH_CHECK_INTERVAL, RunnerOptions, RunnerSnapshot, RunnerStatus, RuntimeEvent, TimerKind,
};
use crate::errors::{AbortCause, UsageError};
use crate::types::{ProcessHandle, QueuedItem, Task, duration_millis};

/// Where the active run is in its lifecycle. No phase means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Running,
    Aborting { cause: AbortCause, attempts: u32 },
}

/// Pure core runtime state.
///
/// This owns:
/// - the pending task queue
/// - the process tracker
/// - the run counters, which survive the end of a run so they can still be
///   read afterwards
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    pub(super) options: RunnerOptions,
    pub(super) queue: TaskQueue,
    pub(super) tracker: ProcessTracker,
    pub(super) total: usize,
    pub(super) completed: usize,
    pub(super) phase: Option<RunPhase>,
    /// Items handed out in a `Launch` command whose handles have not been
    /// registered yet. They count against the concurrency ceiling.
    pub(super) launching: usize,
}

impl CoreRuntime {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options,
            queue: TaskQueue::new(),
            tracker: ProcessTracker::new(),
            total: 0,
            completed: 0,
            phase: None,
            launching: 0,
        }
    }

    /// Whether a run is active (running or aborting).
    pub fn is_running(&self) -> bool {
        self.phase.is_some()
    }

    pub fn phase(&self) -> Option<RunPhase> {
        self.phase
    }

    pub fn total_tasks(&self) -> usize {
        self.total
    }

    pub fn tasks_completed(&self) -> usize {
        self.completed
    }

    /// Expose the tracker (for tests).
    pub fn tracker(&self) -> &ProcessTracker {
        &self.tracker
    }

    /// Expose the queue (for tests).
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            running: self.is_running(),
            total_tasks: self.total,
            tasks_completed: self.completed,
        }
    }

    pub fn snapshot(&self) -> RunnerSnapshot {
        RunnerSnapshot {
            running: self.is_running(),
            total_tasks: self.total,
            tasks_completed: self.completed,
            queue: self.queue.snapshot(),
            running_processes: self.tracker.snapshot(),
        }
    }

    /// Accept a new batch.
    ///
    /// Refused without touching any state when a run is already active or
    /// the batch is empty. A zero timeout is treated as no timeout.
    pub fn start_run(
        &mut self,
        tasks: Vec<Task>,
        timeout: Option<Duration>,
    ) -> Result<CoreStep, UsageError> {
        if self.phase.is_some() {
            return Err(UsageError::AlreadyRunning);
        }
        if tasks.is_empty() {
            return Err(UsageError::NoTaskToRun);
        }

        info!(
            tasks = tasks.len(),
            max_concurrent = self.options.max_concurrent,
            timeout_ms = timeout.map(duration_millis),
            "starting run"
        );

        self.total = tasks.len();
        self.completed = 0;
        self.queue.restart();
        self.phase = Some(RunPhase::Running);

        let mut step = CoreStep::default();

        if let Some(timeout) = timeout.filter(|d| !d.is_zero()) {
            step.push(CoreCommand::ArmTimer {
                timer: TimerKind::RunTimeout,
                schedule: TimerSchedule::Once(timeout),
            });
        }

        if self.options.max_task_execution.is_some() {
            step.push(CoreCommand::ArmTimer {
                timer: TimerKind::HealthCheck,
                schedule: TimerSchedule::Every(HEALTH_CHECK_INTERVAL),
            });
        }

        if self.queue.enqueue(tasks) {
            self.schedule(&mut step);
        }

        Ok(step)
    }

    /// Start the abort protocol for the active run.
    pub fn request_abort(&mut self) -> Result<CoreStep, UsageError> {
        match self.phase {
            None => Err(UsageError::NotRunning),
            Some(RunPhase::Aborting { .. }) => Err(UsageError::AbortInProgress),
            Some(RunPhase::Running) => Ok(self.begin_abort(AbortCause::Requested)),
        }
    }

    /// Register the handle the backend returned for a launched item.
    pub fn track_launched(&mut self, handle: ProcessHandle, item: QueuedItem, now: Instant) {
        self.launching = self.launching.saturating_sub(1);
        if !self.tracker.add(handle, item.id, item.task, now) {
            debug!(%handle, id = item.id, "handle already tracked; ignoring");
        }
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: Instant) -> CoreStep {
        match event {
            RuntimeEvent::ProcessExited { handle, result } => {
                self.handle_process_exit(handle, result, now)
            }
            RuntimeEvent::TimerFired { timer, .. } => self.handle_timer(timer, now),
        }
    }
}
