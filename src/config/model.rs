// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::engine::RunnerOptions;
use crate::errors::Result;
use crate::types::Task;

/// Command file as read from TOML, before validation.
///
/// ```toml
/// [runner]
/// max_concurrent = 4
/// max_task_execution_seconds = 30
/// timeout_seconds = 600
///
/// [[task]]
/// cmd = "gzip -c"
/// stdin = "@data/input.csv"
/// env = { LC_ALL = "C" }
/// tags = { name = "compress" }
/// ```
///
/// All sections are optional and have reasonable defaults; validation then
/// insists on at least one task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommandFile {
    #[serde(default)]
    pub runner: RunnerSection,

    /// `[[task]]` entries, in run order.
    #[serde(default)]
    pub task: Vec<Task>,
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    /// Maximum number of processes running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Processes running longer than this are killed by the health check.
    #[serde(default)]
    pub max_task_execution_seconds: Option<u64>,

    /// Overall deadline for the whole batch; the run is aborted once it
    /// elapses.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_task_execution_seconds: None,
            timeout_seconds: None,
        }
    }
}

/// Validated command file. Only obtainable through
/// `TryFrom<RawCommandFile>`.
#[derive(Debug, Clone)]
pub struct CommandFile {
    pub runner: RunnerSection,
    pub tasks: Vec<Task>,
}

impl CommandFile {
    pub(crate) fn new_unchecked(runner: RunnerSection, tasks: Vec<Task>) -> Self {
        Self { runner, tasks }
    }

    pub fn runner_options(&self) -> Result<RunnerOptions> {
        RunnerOptions::new(
            self.runner.max_concurrent,
            self.runner.max_task_execution_seconds.map(Duration::from_secs),
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.runner.timeout_seconds.map(Duration::from_secs)
    }
}
