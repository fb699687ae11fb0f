// src/workload/commands.rs

//! The workload binary's subcommands, invoked as opaque verbs.
//!
//! Only exit status, stdout (where a verb returns data) and stderr are ever
//! looked at.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Result, ServeError};
use crate::exec::{run_captured, CommandSpec};

#[derive(Debug, Clone)]
pub struct WorkloadCommands {
    binary: PathBuf,
    home: PathBuf,
    keyring_backend: String,
}

/// The part of `keys add --output json` we care about.
#[derive(Debug, Deserialize)]
struct KeyOutput {
    address: String,
}

impl WorkloadCommands {
    pub fn new(binary: impl Into<PathBuf>, home: impl Into<PathBuf>, keyring_backend: &str) -> Self {
        Self {
            binary: binary.into(),
            home: home.into(),
            keyring_backend: keyring_backend.to_string(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn keyring_backend(&self) -> &str {
        &self.keyring_backend
    }

    /// `<binary> <args...> --home <home>`
    pub fn spec<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        CommandSpec::new(self.binary.as_os_str())
            .args(args)
            .arg("--home")
            .arg(self.home.as_os_str())
    }

    pub async fn init(&self, moniker: &str, chain_id: &str) -> Result<()> {
        run_captured(&self.spec(["init", moniker, "--chain-id", chain_id])).await?;
        Ok(())
    }

    /// Create (or, given a mnemonic, recover) a key and return its address.
    pub async fn add_key(&self, name: &str, mnemonic: Option<&str>) -> Result<String> {
        let mut spec = self.spec([
            "keys",
            "add",
            name,
            "--output",
            "json",
            "--keyring-backend",
            self.keyring_backend.as_str(),
        ]);
        if let Some(mnemonic) = mnemonic {
            spec = spec.arg("--recover").stdin(format!("{mnemonic}\n"));
        }

        let out = run_captured(&spec).await?;
        // Older releases print the key document on stderr.
        let doc = if out.stdout.trim().is_empty() { &out.stderr } else { &out.stdout };
        let key: KeyOutput = serde_json::from_str(last_json_line(doc)).map_err(|e| {
            ServeError::Config(format!("cannot read address of key '{name}': {e}"))
        })?;
        Ok(key.address)
    }

    pub async fn add_genesis_account(&self, address: &str, coins: &[String]) -> Result<()> {
        let coins = coins.join(",");
        run_captured(&self.spec(["add-genesis-account", address, coins.as_str()])).await?;
        Ok(())
    }

    pub async fn collect_gentxs(&self) -> Result<()> {
        run_captured(&self.spec(["collect-gentxs"])).await?;
        Ok(())
    }

    pub async fn validate_genesis(&self) -> Result<()> {
        run_captured(&self.spec(["validate-genesis"])).await?;
        Ok(())
    }

    /// Wipe the data directory, keeping config and keys.
    pub async fn unsafe_reset_all(&self) -> Result<()> {
        run_captured(&self.spec(["unsafe-reset-all"])).await?;
        Ok(())
    }

    /// Export the current state document.
    pub async fn export(&self) -> Result<String> {
        let out = run_captured(&self.spec(["export"])).await?;
        // Some releases write the export to stderr.
        if out.stdout.trim().is_empty() {
            Ok(out.stderr)
        } else {
            Ok(out.stdout)
        }
    }
}

/// Keys commands may print warnings before the JSON document.
fn last_json_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .unwrap_or_else(|| output.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_appends_home() {
        let cmds = WorkloadCommands::new("/bin/marsd", "/tmp/mars", "test");
        assert_eq!(
            cmds.spec(["collect-gentxs"]).to_string(),
            "/bin/marsd collect-gentxs --home /tmp/mars"
        );
    }

    #[test]
    fn key_json_is_found_after_warnings() {
        let out = "WARNING: keyring is unsafe\n{\"name\":\"alice\",\"address\":\"mars1abc\"}\n";
        let key: KeyOutput = serde_json::from_str(last_json_line(out)).unwrap();
        assert_eq!(key.address, "mars1abc");
    }
}
