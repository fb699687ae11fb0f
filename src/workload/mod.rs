// src/workload/mod.rs

//! The concrete workload: building its binary, bootstrapping its state and
//! running it.
//!
//! - `commands.rs`: typed wrappers around the workload binary's subcommands.
//! - `driver.rs`: per-family configuration and start arguments.
//! - `entrypoint.rs`: locating the `package main` directory.
//! - `builder.rs`: dependency tidy/verify and the compile step.
//! - `initializer.rs`: fresh bootstrap and import of saved state.
//! - `local.rs`: [`LocalWorkload`], the production `WorkloadBackend`.

pub mod builder;
pub mod commands;
pub mod driver;
pub mod entrypoint;
pub mod initializer;
pub mod local;

pub use builder::{ldflags, ArtifactBuilder, BuildIdentity, BuildSettings};
pub use commands::WorkloadCommands;
pub use driver::{driver_for, StargateDriver, WorkloadDriver};
pub use entrypoint::discover_main;
pub use initializer::StateInitializer;
pub use local::{LocalWorkload, WorkloadSettings};
