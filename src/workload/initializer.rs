// src/workload/initializer.rs

//! Producing the workload's bootstrap state.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::commands::WorkloadCommands;
use super::driver::WorkloadDriver;
use crate::config::overlay::{apply_json_overlay, apply_toml_overlay};
use crate::config::Config;
use crate::errors::{Result, ServeError};
use crate::exec::run_captured;
use crate::fs::FileSystem;

#[derive(Debug, Clone)]
pub struct StateInitializer {
    config: Arc<Config>,
    commands: WorkloadCommands,
    driver: Arc<dyn WorkloadDriver>,
    fs: Arc<dyn FileSystem>,
}

impl StateInitializer {
    pub fn new(
        config: Arc<Config>,
        commands: WorkloadCommands,
        driver: Arc<dyn WorkloadDriver>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            config,
            commands,
            driver,
            fs,
        }
    }

    /// A home that went through gentx has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.fs
            .exists(&self.driver.home().join("config").join("gentx"))
    }

    /// Wipe the home directory and bootstrap a fresh state.
    pub async fn initialize_fresh(&self) -> Result<()> {
        let home = self.driver.home();
        let chain_id = self.config.identity();

        info!(home = ?home, chain_id, "initializing fresh workload state");
        self.fs.remove_dir_all(home)?;

        self.commands.init(&self.config.workload.name, chain_id).await?;
        self.driver.configure(self.fs.as_ref(), &self.config.host, chain_id)?;
        self.apply_overlays()?;
        self.fund_accounts().await?;

        run_captured(&self.driver.gentx(&self.config.validator, chain_id)).await?;
        self.commands.collect_gentxs().await?;

        self.commands.validate_genesis().await.map_err(|e| match e {
            ServeError::Process(failure) => ServeError::Validation(format!(
                "the bootstrap state is invalid:\n{}",
                failure.stderr_tail.trim()
            )),
            other => other,
        })
    }

    /// Reset the data directory and install `exported` as the bootstrap state.
    pub async fn import_prior(&self, exported: &Path) -> Result<()> {
        info!(exported = ?exported, "importing previously exported state");
        self.commands.unsafe_reset_all().await?;
        self.fs.copy(exported, &self.driver.genesis_json())?;
        Ok(())
    }

    fn apply_overlays(&self) -> Result<()> {
        let fs = self.fs.as_ref();
        apply_toml_overlay(fs, &self.driver.app_toml(), &self.config.init.app)?;
        apply_toml_overlay(fs, &self.driver.client_toml(), &self.config.init.client)?;
        apply_toml_overlay(fs, &self.driver.config_toml(), &self.config.init.config)?;

        let mut genesis = serde_json::to_value(&self.config.genesis)?;
        if let Value::Object(map) = &mut genesis {
            map.insert(
                "chain_id".to_string(),
                Value::String(self.config.identity().to_string()),
            );
        }
        apply_json_overlay(fs, &self.driver.genesis_json(), &genesis)
    }

    async fn fund_accounts(&self) -> Result<()> {
        for account in &self.config.accounts {
            let address = match &account.address {
                Some(address) => address.clone(),
                None => {
                    self.commands
                        .add_key(&account.name, account.mnemonic.as_deref())
                        .await?
                }
            };
            info!(account = %account.name, %address, "funding account");
            if !account.coins.is_empty() {
                self.commands
                    .add_genesis_account(&address, &account.coins)
                    .await?;
            }
        }
        Ok(())
    }
}
