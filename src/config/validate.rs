// src/config/validate.rs

use crate::config::model::{CommandFile, RawCommandFile};
use crate::errors::{BatchrunError, Result};

impl TryFrom<RawCommandFile> for CommandFile {
    type Error = BatchrunError;

    fn try_from(raw: RawCommandFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_command_file(&raw)?;
        Ok(CommandFile::new_unchecked(raw.runner, raw.task))
    }
}

fn validate_raw_command_file(file: &RawCommandFile) -> Result<()> {
    ensure_has_tasks(file)?;
    validate_runner_section(file)?;
    validate_tasks(file)?;
    Ok(())
}

fn ensure_has_tasks(file: &RawCommandFile) -> Result<()> {
    if file.task.is_empty() {
        return Err(BatchrunError::ConfigError(
            "command file must contain at least one task".to_string(),
        ));
    }
    Ok(())
}

fn validate_runner_section(file: &RawCommandFile) -> Result<()> {
    let runner = &file.runner;

    if runner.max_concurrent == 0 {
        return Err(BatchrunError::ConfigError(
            "[runner].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }

    if runner.max_task_execution_seconds == Some(0) {
        return Err(BatchrunError::ConfigError(
            "[runner].max_task_execution_seconds must be > 0".to_string(),
        ));
    }

    if runner.timeout_seconds == Some(0) {
        return Err(BatchrunError::ConfigError(
            "[runner].timeout_seconds must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_tasks(file: &RawCommandFile) -> Result<()> {
    for (index, task) in file.task.iter().enumerate() {
        if task.cmd.trim().is_empty() {
            return Err(BatchrunError::ConfigError(format!(
                "task #{index} has an empty `cmd`"
            )));
        }
    }
    Ok(())
}
