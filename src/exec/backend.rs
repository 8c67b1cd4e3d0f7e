// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The runtime talks to a `ProcessBackend` instead of spawning processes
//! itself. This makes it easy to swap in a fake backend in tests while keeping
//! the production implementation in [`task_runner`](super::task_runner).
//!
//! - `RealProcessBackend` is the default implementation used by `batchrun`.
//!   It spawns one OS process per task and reports every exit as a
//!   [`RuntimeEvent::ProcessExited`].
//! - Tests can provide their own `ProcessBackend` that, for example, records
//!   which tasks were launched and emits scripted exits.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::engine::RuntimeEvent;
use crate::types::{ExecutionResult, ProcessHandle, Task};

use super::kill::kill_process_tree;
use super::task_runner::{build_command, run_task};

/// Process launcher plus tree killer.
///
/// Production code uses [`RealProcessBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait ProcessBackend: Send {
    /// Start one process for `task` and return its handle immediately.
    ///
    /// Exactly one [`RuntimeEvent::ProcessExited`] must eventually be sent for
    /// the returned handle, whatever happens to the process, including when
    /// it could not be started at all.
    fn launch(&mut self, task: &Task) -> ProcessHandle;

    /// Best-effort, fire-and-forget termination of the process behind
    /// `handle` and all of its descendants.
    fn kill_tree(&mut self, handle: ProcessHandle);
}

/// Internal handle for a currently-running task process.
struct ActiveProcess {
    /// OS pid; also the process group id since every task leads its own
    /// group.
    pid: Option<u32>,
    /// The Tokio task supervising the process.
    join: JoinHandle<()>,
}

/// Real process backend used in production.
pub struct RealProcessBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    next_handle: u64,
    active: HashMap<ProcessHandle, ActiveProcess>,
}

impl RealProcessBackend {
    /// Create a new real backend, wiring it to the given runtime event
    /// sender.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            next_handle: 1,
            active: HashMap::new(),
        }
    }

    fn next_handle(&mut self) -> ProcessHandle {
        let handle = ProcessHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn prune_finished(&mut self) {
        self.active.retain(|_, process| !process.join.is_finished());
    }

    /// Report an exit from outside a supervising task.
    fn report(&self, handle: ProcessHandle, result: ExecutionResult) {
        let tx = self.runtime_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(RuntimeEvent::ProcessExited { handle, result }).await;
        });
    }
}

impl ProcessBackend for RealProcessBackend {
    fn launch(&mut self, task: &Task) -> ProcessHandle {
        self.prune_finished();
        let handle = self.next_handle();

        let mut command = build_command(task);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(%handle, cmd = %task.cmd, error = %err, "failed to spawn task process");
                self.report(
                    handle,
                    ExecutionResult::launch_failure(format!("failed to spawn '{}': {err}", task.cmd)),
                );
                return handle;
            }
        };

        let pid = child.id();
        debug!(%handle, ?pid, cmd = %task.cmd, "task process spawned");

        let join = tokio::spawn(run_task(
            handle,
            child,
            task.input().cloned(),
            self.runtime_tx.clone(),
        ));

        self.active.insert(handle, ActiveProcess { pid, join });
        handle
    }

    fn kill_tree(&mut self, handle: ProcessHandle) {
        match self.active.get(&handle) {
            Some(process) if !process.join.is_finished() => match process.pid {
                Some(pid) => kill_process_tree(pid),
                None => debug!(%handle, "process has no pid; already reaped"),
            },
            _ => warn!(%handle, "kill requested for a process that is no longer running"),
        }
    }
}

impl Drop for RealProcessBackend {
    fn drop(&mut self) {
        for (handle, process) in self.active.drain() {
            if process.join.is_finished() {
                continue;
            }
            if let Some(pid) = process.pid {
                debug!(%handle, pid, "killing process left running at shutdown");
                kill_process_tree(pid);
            }
            process.join.abort();
        }
    }
}
