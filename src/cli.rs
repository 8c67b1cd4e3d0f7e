// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_command_file;

/// Command-line arguments for `batchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "batchrun",
    version,
    about = "Run a batch of shell commands with bounded concurrency.",
    long_about = None
)]
pub struct CliArgs {
    /// Command file: TOML (`*.toml`) or one command per line.
    ///
    /// Default: `Batchrun.toml` in the current working directory.
    #[arg(short, long, value_name = "PATH", default_value_os_t = default_command_file())]
    pub file: PathBuf,

    /// Maximum number of commands running at once. Overrides
    /// `[runner].max_concurrent`.
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub concurrency: Option<u64>,

    /// Kill commands running longer than this many seconds. Overrides
    /// `[runner].max_task_execution_seconds`.
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_task_seconds: Option<u64>,

    /// Abort the whole batch after this many seconds. Overrides
    /// `[runner].timeout_seconds`.
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Print events as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate and print the batch, but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
