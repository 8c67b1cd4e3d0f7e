#![allow(dead_code)]

use std::time::{Duration, Instant};

use batchrun::engine::{
    CoreCommand, CoreRuntime, CoreStep, RunnerEvent, RunnerOptions, RuntimeEvent, TimerKind,
};
use batchrun::errors::{RunError, UsageError};
use batchrun::types::{ExecutionResult, ProcessHandle, QueuedItem, Task};

/// Drives a [`CoreRuntime`] the way the async runtime does, without Tokio:
/// launches get sequential handles and are registered immediately, and time
/// only moves when told to.
pub struct CoreHarness {
    pub core: CoreRuntime,
    pub now: Instant,
    next_handle: u64,
    /// Every launch so far, in launch order.
    pub launched: Vec<(ProcessHandle, QueuedItem)>,
}

impl CoreHarness {
    pub fn new(max_concurrent: usize, max_task_execution: Option<Duration>) -> Self {
        let options =
            RunnerOptions::new(max_concurrent, max_task_execution).expect("valid options");
        Self {
            core: CoreRuntime::new(options),
            now: Instant::now(),
            next_handle: 1,
            launched: Vec::new(),
        }
    }

    /// Register the launches of `step` like the runtime would.
    pub fn apply(&mut self, step: CoreStep) -> CoreStep {
        for command in &step.commands {
            if let CoreCommand::Launch(items) = command {
                for item in items {
                    let handle = ProcessHandle(self.next_handle);
                    self.next_handle += 1;
                    self.core.track_launched(handle, item.clone(), self.now);
                    self.launched.push((handle, item.clone()));
                }
            }
        }
        step
    }

    pub fn start(&mut self, tasks: Vec<Task>, timeout: Option<Duration>) -> Result<CoreStep, UsageError> {
        let step = self.core.start_run(tasks, timeout)?;
        Ok(self.apply(step))
    }

    pub fn abort(&mut self) -> Result<CoreStep, UsageError> {
        let step = self.core.request_abort()?;
        Ok(self.apply(step))
    }

    pub fn exit(&mut self, handle: ProcessHandle, code: i32) -> CoreStep {
        self.exit_with(handle, ExecutionResult::exited(code))
    }

    pub fn exit_with(&mut self, handle: ProcessHandle, result: ExecutionResult) -> CoreStep {
        let step = self
            .core
            .step(RuntimeEvent::ProcessExited { handle, result }, self.now);
        self.apply(step)
    }

    pub fn fire(&mut self, timer: TimerKind) -> CoreStep {
        let step = self
            .core
            .step(RuntimeEvent::TimerFired { timer, generation: 0 }, self.now);
        self.apply(step)
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Handle of the most recent launch of sequence id `id`.
    pub fn handle_of(&self, id: u64) -> ProcessHandle {
        self.launched
            .iter()
            .rev()
            .find(|(_, item)| item.id == id)
            .map(|(handle, _)| *handle)
            .unwrap_or_else(|| panic!("task #{id} was never launched"))
    }
}

/// Ids launched by `step`, in order.
pub fn launched_ids(step: &CoreStep) -> Vec<u64> {
    step.launched().iter().map(|item| item.id).collect()
}

/// Event names notified by `step`, in order.
pub fn notified(step: &CoreStep) -> Vec<&'static str> {
    step.notifications()
        .map(batchrun_test_utils::event_name)
        .collect()
}

pub fn run_resolution(step: &CoreStep) -> Option<Result<(), RunError>> {
    step.commands.iter().find_map(|command| match command {
        CoreCommand::ResolveRun(outcome) => Some(outcome.clone()),
        _ => None,
    })
}

pub fn abort_resolution(step: &CoreStep) -> Option<Result<(), RunError>> {
    step.commands.iter().find_map(|command| match command {
        CoreCommand::ResolveAbort(outcome) => Some(outcome.clone()),
        _ => None,
    })
}

pub fn killed_handles(step: &CoreStep) -> Vec<ProcessHandle> {
    step.commands
        .iter()
        .filter_map(|command| match command {
            CoreCommand::Kill(tasks) => Some(tasks.iter().map(|t| t.handle)),
            _ => None,
        })
        .flatten()
        .collect()
}

pub fn has_command(step: &CoreStep, pred: impl Fn(&CoreCommand) -> bool) -> bool {
    step.commands.iter().any(pred)
}

/// The `TaskComplete` events of `step` as (id, exit code).
pub fn completions(step: &CoreStep) -> Vec<(u64, Option<i32>)> {
    step.notifications()
        .filter_map(|event| match event {
            RunnerEvent::TaskComplete { id, result, .. } => Some((*id, result.exit_code)),
            _ => None,
        })
        .collect()
}
