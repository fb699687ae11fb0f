#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::PathBuf;

use nodeserve::config::{AccountConfig, AuxiliaryConfig, Config, RawConfig};
use nodeserve::errors::Result;

/// Builder for workload configs, usable both as a `Config` value and as the
/// TOML text of a `nodeserve.toml`.
pub struct ConfigBuilder {
    raw: RawConfig,
}

impl ConfigBuilder {
    /// A minimal valid config: workload `name`, validator `alice`, one funded
    /// account `alice`.
    pub fn new(name: &str) -> Self {
        let mut raw = RawConfig::default();
        raw.workload.name = name.to_string();
        raw.validator.name = "alice".to_string();
        raw.accounts.push(AccountConfig {
            name: "alice".to_string(),
            coins: vec!["200000000stake".to_string()],
            ..AccountConfig::default()
        });
        Self { raw }
    }

    /// A config with nothing set; `try_build` on it fails validation.
    pub fn empty() -> Self {
        Self {
            raw: RawConfig::default(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.raw.workload.id = Some(id.to_string());
        self
    }

    pub fn validator(mut self, name: &str) -> Self {
        self.raw.validator.name = name.to_string();
        self
    }

    pub fn account(mut self, name: &str, coins: &[&str]) -> Self {
        self.raw.accounts.push(AccountConfig {
            name: name.to_string(),
            coins: coins.iter().map(|c| c.to_string()).collect(),
            ..AccountConfig::default()
        });
        self
    }

    pub fn without_accounts(mut self) -> Self {
        self.raw.accounts.clear();
        self
    }

    pub fn watch_paths(mut self, paths: &[&str]) -> Self {
        self.raw.watch.paths = paths.iter().map(PathBuf::from).collect();
        self
    }

    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.raw.workload.home = Some(home.into());
        self
    }

    pub fn auxiliary(mut self, name: &str, cmd: &str) -> Self {
        self.raw.auxiliary.push(AuxiliaryConfig {
            name: name.to_string(),
            cmd: cmd.to_string(),
        });
        self
    }

    pub fn raw(&self) -> &RawConfig {
        &self.raw
    }

    pub fn try_build(self) -> Result<Config> {
        Config::try_from(self.raw)
    }

    pub fn build(self) -> Config {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }

    /// Render the fields this builder sets as TOML.
    pub fn to_toml(&self) -> String {
        let raw = &self.raw;
        let mut out = String::new();

        let _ = writeln!(out, "[workload]");
        let _ = writeln!(out, "name = {:?}", raw.workload.name);
        if let Some(id) = &raw.workload.id {
            let _ = writeln!(out, "id = {id:?}");
        }
        if let Some(home) = &raw.workload.home {
            let _ = writeln!(out, "home = {:?}", home.to_string_lossy());
        }

        let _ = writeln!(out, "\n[watch]");
        let paths: Vec<String> = raw
            .watch
            .paths
            .iter()
            .map(|p| format!("{:?}", p.to_string_lossy()))
            .collect();
        let _ = writeln!(out, "paths = [{}]", paths.join(", "));

        let _ = writeln!(out, "\n[validator]");
        let _ = writeln!(out, "name = {:?}", raw.validator.name);

        for account in &raw.accounts {
            let coins: Vec<String> = account.coins.iter().map(|c| format!("{c:?}")).collect();
            let _ = writeln!(out, "\n[[accounts]]");
            let _ = writeln!(out, "name = {:?}", account.name);
            let _ = writeln!(out, "coins = [{}]", coins.join(", "));
        }

        for aux in &raw.auxiliary {
            let _ = writeln!(out, "\n[[auxiliary]]");
            let _ = writeln!(out, "name = {:?}", aux.name);
            let _ = writeln!(out, "cmd = {:?}", aux.cmd);
        }

        out
    }
}
