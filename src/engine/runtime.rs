// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::errors::RunError;
use crate::exec::ProcessBackend;
use crate::types::{QueuedItem, RunningTask, Task};

use super::core::CoreRuntime;
use super::timers::Timers;
use super::{CoreCommand, CoreStep, RunnerEvent, RunnerSnapshot, RunnerStatus, RuntimeEvent};

/// Outcome delivered to `run` / `abort` callers.
pub type RunOutcome = Result<(), RunError>;

/// Requests sent by [`TasksRunner`](crate::runner::TasksRunner) handles.
#[derive(Debug)]
pub enum RunnerCommand {
    Run {
        tasks: Vec<Task>,
        timeout: Option<Duration>,
        reply: oneshot::Sender<RunOutcome>,
    },
    Abort {
        reply: oneshot::Sender<RunOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<RunnerSnapshot>,
    },
    Subscribe(mpsc::UnboundedSender<RunnerEvent>),
}

/// Drives the [`CoreRuntime`] in response to caller requests and
/// `RuntimeEvent`s, and delegates process handling to a `ProcessBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading requests and
/// events from channels, launching and killing processes, running timers and
/// fanning out notifications.
pub struct Runtime<B: ProcessBackend> {
    core: CoreRuntime,
    command_rx: mpsc::UnboundedReceiver<RunnerCommand>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: B,
    timers: Timers,
    subscribers: Vec<mpsc::UnboundedSender<RunnerEvent>>,
    run_reply: Option<oneshot::Sender<RunOutcome>>,
    abort_reply: Option<oneshot::Sender<RunOutcome>>,
    status_tx: watch::Sender<RunnerStatus>,
}

impl<B: ProcessBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> Runtime<B> {
    pub fn new(
        core: CoreRuntime,
        command_rx: mpsc::UnboundedReceiver<RunnerCommand>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        backend: B,
        status_tx: watch::Sender<RunnerStatus>,
    ) -> Self {
        Self {
            core,
            command_rx,
            event_rx,
            backend,
            timers: Timers::new(event_tx),
            subscribers: Vec::new(),
            run_reply: None,
            abort_reply: None,
            status_tx,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RunnerCommand`s from handles and `RuntimeEvent`s from the
    ///   backend and the timers.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core.
    ///
    /// Returns once every handle is gone. Pending callers then observe
    /// [`RunError::Shutdown`] and the backend is dropped, which kills
    /// whatever it still runs.
    pub async fn run(mut self) {
        info!("batchrun runtime started");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("all runner handles dropped; exiting");
                        break;
                    }
                },
                Some(event) = self.event_rx.recv() => self.handle_event(event),
            }
        }

        self.timers.cancel_all();
        info!("runtime exiting");
    }

    fn handle_command(&mut self, command: RunnerCommand) {
        match command {
            RunnerCommand::Run {
                tasks,
                timeout,
                reply,
            } => match self.core.start_run(tasks, timeout) {
                Ok(step) => {
                    self.run_reply = Some(reply);
                    self.execute(step);
                }
                Err(reason) => {
                    debug!(%reason, "run refused");
                    let _ = reply.send(Err(reason.into()));
                }
            },
            RunnerCommand::Abort { reply } => match self.core.request_abort() {
                Ok(step) => {
                    self.abort_reply = Some(reply);
                    self.execute(step);
                }
                Err(reason) => {
                    debug!(%reason, "abort refused");
                    let _ = reply.send(Err(reason.into()));
                }
            },
            RunnerCommand::Snapshot { reply } => {
                let _ = reply.send(self.core.snapshot());
            }
            RunnerCommand::Subscribe(tx) => {
                self.subscribers.push(tx);
            }
        }
    }

    fn handle_event(&mut self, event: RuntimeEvent) {
        if let RuntimeEvent::TimerFired { timer, generation } = event {
            if !self.timers.accept(timer, generation) {
                return;
            }
        }

        debug!(?event, "runtime received event");
        let step = self.core.step(event, now());
        self.execute(step);
    }

    /// Execute the commands of one core step, in order.
    ///
    /// The status is published first so that a caller woken up by a
    /// resolution already sees the final counters.
    fn execute(&mut self, step: CoreStep) {
        self.status_tx.send_replace(self.core.status());

        for command in step.commands {
            self.execute_command(command);
        }
    }

    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Launch(items) => self.launch(items),
            CoreCommand::Kill(tasks) => self.kill(tasks),
            CoreCommand::Notify(event) => {
                self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
            }
            CoreCommand::ArmTimer { timer, schedule } => self.timers.arm(timer, schedule),
            CoreCommand::CancelTimer(timer) => self.timers.cancel(timer),
            CoreCommand::ResolveRun(outcome) => {
                if let Some(reply) = self.run_reply.take() {
                    let _ = reply.send(outcome);
                }
            }
            CoreCommand::ResolveAbort(outcome) => {
                if let Some(reply) = self.abort_reply.take() {
                    let _ = reply.send(outcome);
                }
            }
        }
    }

    fn launch(&mut self, items: Vec<QueuedItem>) {
        for item in items {
            let handle = self.backend.launch(&item.task);
            debug!(id = item.id, %handle, cmd = %item.task.cmd, "task launched");
            self.core.track_launched(handle, item, now());
        }
    }

    fn kill(&mut self, tasks: Vec<RunningTask>) {
        for task in tasks {
            debug!(%task, "killing process tree");
            self.backend.kill_tree(task.handle);
        }
    }
}

/// Current time on the Tokio clock, so paused-time tests stay consistent.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
