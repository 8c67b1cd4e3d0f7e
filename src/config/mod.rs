// src/config/mod.rs

//! Command file loading and validation for batchrun.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a command file from disk (`loader.rs`).
//! - Validate it (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_command_file, load_and_validate, load_from_path, parse_command_lines};
pub use model::{CommandFile, RawCommandFile, RunnerSection};
