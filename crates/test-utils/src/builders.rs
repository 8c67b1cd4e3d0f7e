#![allow(dead_code)]

use batchrun::config::{CommandFile, RawCommandFile, RunnerSection};
use batchrun::types::Task;

/// Builder for `CommandFile` to simplify test setup.
pub struct CommandFileBuilder {
    file: RawCommandFile,
}

impl CommandFileBuilder {
    pub fn new() -> Self {
        Self {
            file: RawCommandFile {
                runner: RunnerSection::default(),
                task: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.file.task.push(task);
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.file.runner.max_concurrent = n;
        self
    }

    pub fn max_task_execution_seconds(mut self, secs: u64) -> Self {
        self.file.runner.max_task_execution_seconds = Some(secs);
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.file.runner.timeout_seconds = Some(secs);
        self
    }

    pub fn build_raw(self) -> RawCommandFile {
        self.file
    }

    pub fn build(self) -> CommandFile {
        CommandFile::try_from(self.file).expect("Failed to build valid command file from builder")
    }
}

impl Default for CommandFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tasks for the given commands, in order.
pub fn tasks(cmds: &[&str]) -> Vec<Task> {
    cmds.iter().map(|cmd| Task::new(*cmd)).collect()
}

/// A fake-backend task that exits 0 after `ms` milliseconds.
pub fn sleep_task(ms: u64) -> Task {
    Task::new(format!("sleep {ms}"))
}

/// A fake-backend task that exits with `code` immediately.
pub fn failing_task(code: i32) -> Task {
    Task::new(format!("fail {code}"))
}

/// A fake-backend task that only ends when killed.
pub fn hanging_task() -> Task {
    Task::new("hang")
}

/// A fake-backend task that survives every kill.
pub fn stubborn_task() -> Task {
    Task::new("stubborn")
}
