// src/workload/driver.rs

//! Per-family knowledge of the workload's command line and config files.
//!
//! A driver is picked once from `workload.family` when the workload is set
//! up; nothing downstream branches on the family again.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use toml::Table;

use super::commands::WorkloadCommands;
use crate::config::overlay::apply_toml_overlay;
use crate::config::{HostSection, ValidatorSection, WorkloadFamily};
use crate::errors::Result;
use crate::exec::CommandSpec;
use crate::fs::FileSystem;

/// Capabilities that differ between workload families.
pub trait WorkloadDriver: Send + Sync + Debug {
    fn family(&self) -> WorkloadFamily;

    /// Data directory the workload runs against.
    fn home(&self) -> &Path;

    /// Command creating the validator's genesis transaction.
    fn gentx(&self, validator: &ValidatorSection, chain_id: &str) -> CommandSpec;

    /// Write host addresses and client defaults into the generated config files.
    fn configure(&self, fs: &dyn FileSystem, host: &HostSection, chain_id: &str) -> Result<()>;

    /// Command that runs the workload in the foreground.
    fn start(&self, host: &HostSection) -> CommandSpec;

    fn app_toml(&self) -> PathBuf {
        self.home().join("config").join("app.toml")
    }

    fn config_toml(&self) -> PathBuf {
        self.home().join("config").join("config.toml")
    }

    fn client_toml(&self) -> PathBuf {
        self.home().join("config").join("client.toml")
    }

    fn genesis_json(&self) -> PathBuf {
        self.home().join("config").join("genesis.json")
    }
}

/// Select the driver for `family`.
pub fn driver_for(family: WorkloadFamily, commands: WorkloadCommands) -> Box<dyn WorkloadDriver> {
    match family {
        WorkloadFamily::Stargate => Box::new(StargateDriver::new(commands)),
    }
}

#[derive(Debug, Clone)]
pub struct StargateDriver {
    commands: WorkloadCommands,
}

impl StargateDriver {
    pub fn new(commands: WorkloadCommands) -> Self {
        Self { commands }
    }
}

fn tcp(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("tcp://{addr}")
    }
}

/// Insert `value` at a dotted `path`, creating intermediate tables.
fn set(table: &mut Table, path: &str, value: impl Into<toml::Value>) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };
    let mut current = table;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(Table::new());
        }
        let toml::Value::Table(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(leaf.to_string(), value.into());
}

impl WorkloadDriver for StargateDriver {
    fn family(&self) -> WorkloadFamily {
        WorkloadFamily::Stargate
    }

    fn home(&self) -> &Path {
        self.commands.home()
    }

    fn gentx(&self, validator: &ValidatorSection, chain_id: &str) -> CommandSpec {
        self.commands.spec([
            "gentx",
            validator.name.as_str(),
            validator.staked.as_str(),
            "--chain-id",
            chain_id,
            "--keyring-backend",
            self.commands.keyring_backend(),
        ])
    }

    fn configure(&self, fs: &dyn FileSystem, host: &HostSection, chain_id: &str) -> Result<()> {
        let mut app = Table::new();
        set(&mut app, "api.enable", true);
        set(&mut app, "api.enabled-unsafe-cors", true);
        set(&mut app, "api.address", tcp(&host.api));
        set(&mut app, "grpc.address", host.grpc.as_str());
        set(&mut app, "grpc-web.address", host.grpc_web.as_str());
        apply_toml_overlay(fs, &self.app_toml(), &app)?;

        let mut config = Table::new();
        set(&mut config, "rpc.laddr", tcp(&host.rpc));
        set(&mut config, "rpc.cors_allowed_origins", vec!["*"]);
        set(&mut config, "rpc.pprof_laddr", host.prof.as_str());
        set(&mut config, "p2p.laddr", tcp(&host.p2p));
        set(&mut config, "consensus.timeout_commit", "1s");
        set(&mut config, "consensus.timeout_propose", "1s");
        apply_toml_overlay(fs, &self.config_toml(), &config)?;

        let mut client = Table::new();
        set(&mut client, "chain-id", chain_id);
        set(&mut client, "keyring-backend", self.commands.keyring_backend());
        set(&mut client, "node", tcp(&host.rpc));
        set(&mut client, "broadcast-mode", "block");
        apply_toml_overlay(fs, &self.client_toml(), &client)?;

        Ok(())
    }

    fn start(&self, host: &HostSection) -> CommandSpec {
        self.commands.spec([
            "start",
            "--pruning",
            "nothing",
            "--grpc.address",
            host.grpc.as_str(),
        ])
    }
}
