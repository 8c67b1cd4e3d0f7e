// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod output;
pub mod runner;
pub mod types;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::CommandFile;
use crate::engine::RunnerEvent;
use crate::output::{OutputFormat, format_event};
use crate::runner::TasksRunner;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - command file loading and CLI overrides
/// - the task runner
/// - event printing
/// - Ctrl-C handling (aborts the batch)
pub async fn run(args: CliArgs) -> Result<()> {
    let mut file = load_and_validate(&args.file)
        .with_context(|| format!("loading command file {}", args.file.display()))?;
    apply_cli_overrides(&mut file, &args);

    if args.dry_run {
        print_dry_run(&file);
        return Ok(());
    }

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let runner = TasksRunner::new(file.runner_options()?);
    let mut events = runner.subscribe();

    // Ctrl-C → abort the batch.
    {
        let runner = runner.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; aborting");
            if let Err(e) = runner.abort().await {
                warn!(error = %e, "abort did not complete cleanly");
            }
        });
    }

    let timeout = file.timeout();
    let total = file.tasks.len();
    info!(total, "running batch");

    let run = runner.run(file.tasks, timeout);
    tokio::pin!(run);

    let mut failed = 0usize;
    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            Some(event) = events.recv() => {
                failed += count_failure(&event);
                println!("{}", format_event(&event, format));
            }
        }
    };

    // Events published in the same step as the resolution.
    while let Ok(event) = events.try_recv() {
        failed += count_failure(&event);
        println!("{}", format_event(&event, format));
    }

    if failed > 0 {
        warn!(failed, total, "some tasks failed");
    }

    outcome.context("batch did not complete")?;
    Ok(())
}

/// Apply command-line overrides on top of the command file's `[runner]`
/// section.
pub fn apply_cli_overrides(file: &mut CommandFile, args: &CliArgs) {
    if let Some(n) = args.concurrency {
        file.runner.max_concurrent = usize::try_from(n).unwrap_or(usize::MAX);
    }
    if let Some(secs) = args.max_task_seconds {
        file.runner.max_task_execution_seconds = Some(secs);
    }
    if let Some(secs) = args.timeout {
        file.runner.timeout_seconds = Some(secs);
    }
}

fn count_failure(event: &RunnerEvent) -> usize {
    match event {
        RunnerEvent::TaskComplete { result, .. } if !result.success() => 1,
        _ => 0,
    }
}

/// Simple dry-run output: print runner settings and commands.
fn print_dry_run(file: &CommandFile) {
    println!("batchrun dry-run");
    println!("  runner.max_concurrent = {}", file.runner.max_concurrent);
    if let Some(secs) = file.runner.max_task_execution_seconds {
        println!("  runner.max_task_execution_seconds = {secs}");
    }
    if let Some(secs) = file.runner.timeout_seconds {
        println!("  runner.timeout_seconds = {secs}");
    }
    println!();

    println!("tasks ({}):", file.tasks.len());
    for (id, task) in file.tasks.iter().enumerate() {
        println!("  - #{id}");
        println!("      cmd: {}", task.cmd);
        if !task.env.is_empty() {
            println!("      env: {:?}", task.env);
        }
        if let Some(ref stdin) = task.stdin {
            println!("      stdin: {}", String::from(stdin.clone()));
        }
        if !task.tags.is_empty() {
            println!("      tags: {:?}", task.tags);
        }
    }

    debug!("dry-run complete (no execution)");
}
