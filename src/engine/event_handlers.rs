// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::core::{CoreRuntime, RunPhase};
use crate::engine::{ABORT_RETRY_INTERVAL, MAX_KILL_ATTEMPTS, RunnerEvent, TimerKind};
use crate::errors::{AbortCause, RunError};
use crate::types::{
    ExecutionResult, ProcessHandle, Progress, QueuedItem, RunningTask, duration_millis,
};

/// How an armed timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSchedule {
    /// Once, after the delay.
    Once(Duration),
    /// Repeatedly, first after one period.
    Every(Duration),
}

/// Command produced by the pure core, to be executed by the outer IO shell.
///
/// Commands must be executed in order.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Start these items through the backend, in order, and report each
    /// handle back via `CoreRuntime::track_launched`.
    Launch(Vec<QueuedItem>),
    /// Terminate the process trees behind these handles.
    Kill(Vec<RunningTask>),
    /// Publish an event to subscribers.
    Notify(RunnerEvent),
    /// Arm (or re-arm) a timer.
    ArmTimer {
        timer: TimerKind,
        schedule: TimerSchedule,
    },
    /// Cancel a timer if it is armed.
    CancelTimer(TimerKind),
    /// Resolve the pending `run` caller.
    ResolveRun(Result<(), RunError>),
    /// Resolve the pending `abort` caller, if any.
    ResolveAbort(Result<(), RunError>),
}

/// Decision returned by the core after handling a request or a single
/// `RuntimeEvent`.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
}

impl CoreStep {
    pub(crate) fn push(&mut self, command: CoreCommand) {
        self.commands.push(command);
    }

    /// Events this step publishes, in order.
    pub fn notifications(&self) -> impl Iterator<Item = &RunnerEvent> {
        self.commands.iter().filter_map(|command| match command {
            CoreCommand::Notify(event) => Some(event),
            _ => None,
        })
    }

    /// Every item launched by this step, in launch order.
    pub fn launched(&self) -> Vec<&QueuedItem> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                CoreCommand::Launch(items) => Some(items.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl CoreRuntime {
    /// Launch as many queued items as there is free capacity.
    ///
    /// Only runs while the phase is `Running`; an aborting run never launches
    /// anything.
    pub(super) fn schedule(&mut self, step: &mut CoreStep) {
        if self.phase != Some(RunPhase::Running) {
            return;
        }

        let in_flight = self.tracker.count() + self.launching;
        let available = self.options.max_concurrent.saturating_sub(in_flight);

        let Some(batch) = self.queue.dequeue(available) else {
            return;
        };
        if batch.is_empty() {
            return;
        }

        debug!(
            launching = batch.len(),
            in_flight,
            pending = self.queue.len(),
            "scheduling tasks"
        );
        self.launching += batch.len();
        step.push(CoreCommand::Launch(batch));
    }

    /// A process reported its exit.
    ///
    /// - While running: free capacity is refilled first, then the completion
    ///   is counted and reported, and the run completes once every task has
    ///   finished.
    /// - While aborting: the completion is still reported, but it never
    ///   completes the run; if it was the last live process the abort
    ///   resolves right away.
    /// - Exits for handles the tracker does not know (e.g. after a failed
    ///   abort forgot them) are ignored.
    pub(super) fn handle_process_exit(
        &mut self,
        handle: ProcessHandle,
        result: ExecutionResult,
        now: Instant,
    ) -> CoreStep {
        let mut step = CoreStep::default();

        let Some(removed) = self.tracker.remove(handle, result, now) else {
            debug!(%handle, "exit for untracked process; ignoring");
            return step;
        };

        self.schedule(&mut step);

        self.completed += 1;
        info!(
            id = removed.id,
            %handle,
            exit_code = ?removed.result.exit_code,
            completed = self.completed,
            total = self.total,
            "task completed"
        );

        step.push(CoreCommand::Notify(RunnerEvent::Progress(Progress::new(
            self.total,
            self.completed,
        ))));
        step.push(CoreCommand::Notify(RunnerEvent::TaskComplete {
            id: removed.id,
            task: removed.task,
            handle: removed.handle,
            result: removed.result,
            duration: removed.duration,
        }));

        match self.phase {
            Some(RunPhase::Running) if self.total > 0 && self.completed == self.total => {
                self.complete_run(&mut step);
            }
            Some(RunPhase::Aborting { .. }) if self.tracker.count() == 0 => {
                self.finish_abort(&mut step, Ok(()));
            }
            _ => {}
        }

        step
    }

    fn complete_run(&mut self, step: &mut CoreStep) {
        info!(total = self.total, "run finished");
        step.push(CoreCommand::CancelTimer(TimerKind::HealthCheck));
        step.push(CoreCommand::CancelTimer(TimerKind::RunTimeout));
        step.push(CoreCommand::Notify(RunnerEvent::Finish));
        step.push(CoreCommand::ResolveRun(Ok(())));
        self.phase = None;
    }

    pub(super) fn handle_timer(&mut self, timer: TimerKind, now: Instant) -> CoreStep {
        match (timer, self.phase) {
            (TimerKind::RunTimeout, Some(RunPhase::Running)) => {
                warn!("run timeout elapsed; aborting");
                self.begin_abort(AbortCause::Timeout)
            }
            (TimerKind::HealthCheck, Some(RunPhase::Running)) => self.health_check(now),
            (TimerKind::AbortRetry, Some(RunPhase::Aborting { .. })) => {
                let mut step = CoreStep::default();
                self.abort_attempt(&mut step);
                step
            }
            (timer, phase) => {
                debug!(?timer, ?phase, "timer fired with nothing to do");
                CoreStep::default()
            }
        }
    }

    /// Kill every process that has been running longer than the ceiling.
    /// Their exits come back as ordinary completions.
    fn health_check(&mut self, now: Instant) -> CoreStep {
        let mut step = CoreStep::default();

        let Some(ceiling) = self.options.max_task_execution else {
            return step;
        };

        if let Some(stuck) = self.tracker.tasks_exceeding(ceiling, now) {
            warn!(
                count = stuck.len(),
                ceiling_ms = duration_millis(ceiling),
                "killing tasks over the execution ceiling"
            );
            step.push(CoreCommand::Notify(RunnerEvent::KillingTasks {
                tasks: stuck.clone(),
            }));
            step.push(CoreCommand::Kill(stuck));
        }

        step
    }

    /// Enter `Aborting`: drop pending work, stop run timers and make the first
    /// kill attempt.
    pub(super) fn begin_abort(&mut self, cause: AbortCause) -> CoreStep {
        let mut step = CoreStep::default();

        info!(%cause, running = self.tracker.count(), "aborting run");
        step.push(CoreCommand::Notify(RunnerEvent::Aborting));

        let dropped = self.queue.clear();
        debug!(dropped, "pending tasks dropped by abort");

        step.push(CoreCommand::CancelTimer(TimerKind::HealthCheck));
        step.push(CoreCommand::CancelTimer(TimerKind::RunTimeout));

        self.phase = Some(RunPhase::Aborting { cause, attempts: 0 });
        self.abort_attempt(&mut step);
        step
    }

    fn abort_attempt(&mut self, step: &mut CoreStep) {
        let Some(RunPhase::Aborting { cause, attempts }) = self.phase else {
            return;
        };

        let Some(running) = self.tracker.running_snapshot() else {
            self.finish_abort(step, Ok(()));
            return;
        };

        if attempts < MAX_KILL_ATTEMPTS {
            let attempt = attempts + 1;
            info!(attempt, count = running.len(), "killing running tasks");

            step.push(CoreCommand::Notify(RunnerEvent::KillingTasks {
                tasks: running.clone(),
            }));
            step.push(CoreCommand::Kill(running));

            if attempts == 0 {
                step.push(CoreCommand::ArmTimer {
                    timer: TimerKind::AbortRetry,
                    schedule: TimerSchedule::Every(ABORT_RETRY_INTERVAL),
                });
            }

            self.phase = Some(RunPhase::Aborting {
                cause,
                attempts: attempt,
            });
            return;
        }

        let forgotten = self.tracker.clear();
        warn!(
            attempts,
            forgotten, "giving up on abort; forgetting running tasks"
        );

        self.finish_abort(
            step,
            Err(RunError::AbortFailed {
                attempts,
                still_running: running,
            }),
        );
    }

    /// Resolve the abort (and the run it ended) and return to idle.
    fn finish_abort(&mut self, step: &mut CoreStep, outcome: Result<(), RunError>) {
        let Some(RunPhase::Aborting { cause, .. }) = self.phase else {
            return;
        };

        step.push(CoreCommand::CancelTimer(TimerKind::AbortRetry));

        match outcome {
            Ok(()) => {
                info!(%cause, "run aborted");
                step.push(CoreCommand::Notify(RunnerEvent::Aborted));
                step.push(CoreCommand::ResolveAbort(Ok(())));
                step.push(CoreCommand::ResolveRun(Err(RunError::Aborted { cause })));
            }
            Err(error) => {
                step.push(CoreCommand::Notify(RunnerEvent::AbortFailed {
                    error: error.clone(),
                }));
                step.push(CoreCommand::ResolveAbort(Err(error.clone())));
                step.push(CoreCommand::ResolveRun(Err(error)));
            }
        }

        self.launching = 0;
        self.phase = None;
    }
}
