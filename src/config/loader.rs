// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{CommandFile, RawCommandFile};
use crate::errors::Result;
use crate::types::Task;

/// Load a command file from a given path and return the raw `RawCommandFile`.
///
/// Files ending in `.toml` are deserialized as TOML. Anything else is a plain
/// command list (see [`parse_command_lines`]) run with default `[runner]`
/// settings.
///
/// This does **not** perform semantic validation. Use [`load_and_validate`]
/// for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawCommandFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        let file: RawCommandFile = toml::from_str(&contents)?;
        return Ok(file);
    }

    Ok(RawCommandFile {
        task: parse_command_lines(&contents),
        ..RawCommandFile::default()
    })
}

/// One task per non-blank line; lines starting with `#` are comments.
pub fn parse_command_lines(contents: &str) -> Vec<Task> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Task::new)
        .collect()
}

/// Load a command file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML or a plain command list.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - at least one task,
///   - empty commands,
///   - sane `[runner]` values.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<CommandFile> {
    let raw = load_from_path(&path)?;
    let file = CommandFile::try_from(raw)?;
    Ok(file)
}

/// Command file used when none is given on the command line.
pub fn default_command_file() -> PathBuf {
    PathBuf::from("Batchrun.toml")
}
