// src/watch/mod.rs

//! File watching.
//!
//! Turns filesystem changes under the workload's watch paths into refresh
//! requests for the serve controller. Whether a change actually warrants a
//! rebuild is decided later by the checksum cache; the watcher only scopes
//! which paths are worth a look.

pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use patterns::WatchScope;
pub use watcher::{forward_events, spawn_watcher, WatcherHandle};
