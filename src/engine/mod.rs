// src/engine/mod.rs

//! Serve engine.
//!
//! The pure decision step of a cycle lives in [`plan`]; the async shell that
//! drives the backend through build, init-or-reset, start and export is
//! [`controller`]. [`refresh`] carries refresh requests into the controller
//! and [`verify`] is the one-shot, time-bounded dry run.

pub mod backend;
pub mod controller;
pub mod plan;
pub mod refresh;
pub mod verify;

pub use backend::{BoxFuture, WorkloadBackend};
pub use controller::{ControllerPaths, ServeController, ServeOptions, ServeSession};
pub use plan::{plan_cycle, CycleInputs, CyclePlan, StateAction};
pub use refresh::{RefreshChannel, RefreshHandle};
pub use verify::{verify, DEFAULT_VERIFY_TIMEOUT};
