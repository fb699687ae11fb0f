// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] runs one-shot toolchain / workload verbs and captures output.
//! - [`process`] spawns long-lived processes and stops them with SIGTERM, a
//!   grace period, then SIGKILL.

pub mod command;
pub mod process;

pub use command::{run_captured, CommandOutput, CommandSpec, ProcessFailure, TailBuffer};
pub use process::{spawn_process, RunningProcess, TERMINATION_GRACE};
