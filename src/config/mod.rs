// src/config/mod.rs

//! Configuration loading and validation for nodeserve.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate the workload / validator / accounts invariants (`validate.rs`).
//! - Deep-merge operator overlays onto generated documents (`overlay.rs`).
//! - Locate the tool directory holding the checksum store and saved state.

pub mod loader;
pub mod model;
pub mod overlay;
pub mod validate;

use std::path::{Path, PathBuf};

pub use loader::{load_and_validate, load_from_path, resolve_config_path, DEFAULT_CONFIG_FILE};
pub use model::{
    AccountConfig, AuxiliaryConfig, Config, HostSection, InitOverlays, RawConfig,
    ValidatorSection, WatchSection, WorkloadFamily, WorkloadSection,
};

/// Environment variable overriding the tool directory.
pub const TOOL_HOME_ENV: &str = "NODESERVE_HOME";

/// `$NODESERVE_HOME`, else `~/.nodeserve`.
pub fn tool_dir() -> PathBuf {
    match std::env::var_os(TOOL_HOME_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nodeserve"),
    }
}

pub fn checksum_store_path(tool_dir: &Path) -> PathBuf {
    tool_dir.join("checksums.json")
}

/// Directory holding per-identity exported state snapshots.
pub fn saved_state_dir(tool_dir: &Path) -> PathBuf {
    tool_dir.join("local-chains")
}

/// `<save_dir>/<identity>/exported_genesis.json`
pub fn exported_state_path(save_dir: &Path, identity: &str) -> PathBuf {
    save_dir.join(identity).join("exported_genesis.json")
}
