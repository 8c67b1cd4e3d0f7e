// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running task commands, using
//! `tokio::process::Command`, and reporting back to the orchestration
//! runtime via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ProcessBackend` trait and a concrete
//!   `RealProcessBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.
//! - [`task_runner`] builds and supervises individual task processes.
//! - [`kill`] terminates whole process trees.

pub mod backend;
pub mod kill;
pub mod task_runner;

pub use backend::{ProcessBackend, RealProcessBackend};
pub use kill::kill_process_tree;
