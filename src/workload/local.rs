// src/workload/local.rs

//! Production [`WorkloadBackend`]: a workload built from a local source tree
//! and run as a child process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::builder::{ArtifactBuilder, BuildSettings};
use super::commands::WorkloadCommands;
use super::driver::{driver_for, WorkloadDriver};
use super::initializer::StateInitializer;
use crate::cache::ChecksumCache;
use crate::config::{load_and_validate, Config, HostSection};
use crate::engine::{BoxFuture, WorkloadBackend};
use crate::errors::{Result, ServeError};
use crate::exec::spawn_process;
use crate::fs::FileSystem;
use crate::supervisor::{AuxiliaryService, CommandService, ProcessSupervisor};

#[derive(Debug, Clone)]
pub struct WorkloadSettings {
    pub source_root: PathBuf,
    pub config_path: PathBuf,
    /// Overrides `workload.home` from the config.
    pub home: Option<PathBuf>,
    /// Mirror the workload's output to ours.
    pub echo_output: bool,
}

/// Pieces derived from one loaded configuration.
struct Prepared {
    config: Arc<Config>,
    commands: WorkloadCommands,
    driver: Arc<dyn WorkloadDriver>,
    builder: ArtifactBuilder,
    initializer: StateInitializer,
}

pub struct LocalWorkload {
    settings: WorkloadSettings,
    fs: Arc<dyn FileSystem>,
    host_override: Option<HostSection>,
    services: Vec<Arc<dyn AuxiliaryService>>,
    prepared: Option<Prepared>,
}

impl fmt::Debug for LocalWorkload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWorkload")
            .field("settings", &self.settings)
            .field("host_override", &self.host_override)
            .field("services", &self.services.len())
            .finish_non_exhaustive()
    }
}

impl LocalWorkload {
    pub fn new(settings: WorkloadSettings, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            settings,
            fs,
            host_override: None,
            services: Vec::new(),
            prepared: None,
        }
    }

    /// Supervise an already-constructed service next to the workload, in
    /// addition to the `[[auxiliary]]` commands from the config.
    pub fn with_service(mut self, service: Arc<dyn AuxiliaryService>) -> Self {
        self.services.push(service);
        self
    }

    /// Load and validate the config, then derive the builder, driver and
    /// initializer from it.
    pub fn load(&mut self) -> Result<&Config> {
        let mut config = load_and_validate(&self.settings.config_path).map_err(|e| match e {
            ServeError::Io(io) => ServeError::Config(format!(
                "cannot read {}: {io}",
                self.settings.config_path.display()
            )),
            other => other,
        })?;
        if let Some(host) = &self.host_override {
            config.host = host.clone();
        }
        let prepared = self.assemble(config);
        Ok(self.prepared.insert(prepared).config.as_ref())
    }

    fn assemble(&self, config: Config) -> Prepared {
        let root = &self.settings.source_root;
        let home = self.settings.home.clone().unwrap_or_else(|| config.home_dir());
        let binary = config.binary_path(root);

        let commands = WorkloadCommands::new(binary, home, &config.workload.keyring_backend);
        let driver: Arc<dyn WorkloadDriver> =
            Arc::from(driver_for(config.workload.family, commands.clone()));

        let builder = ArtifactBuilder::new(
            BuildSettings {
                toolchain: config.workload.toolchain.clone(),
                source_root: root.clone(),
                output_dir: config.output_dir(root),
                binary_name: config.binary_name(),
                main: config.workload.main.clone(),
                extra_ldflags: config.workload.ldflags.clone(),
                name: config.workload.name.clone(),
                chain_id: config.identity().to_string(),
            },
            Arc::clone(&self.fs),
        );

        let config = Arc::new(config);
        let initializer = StateInitializer::new(
            Arc::clone(&config),
            commands.clone(),
            Arc::clone(&driver),
            Arc::clone(&self.fs),
        );

        Prepared {
            config,
            commands,
            driver,
            builder,
            initializer,
        }
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or_else(|| ServeError::Config("workload configuration has not been loaded".into()))
    }

    fn auxiliary_services(&self, config: &Config) -> Vec<Arc<dyn AuxiliaryService>> {
        let mut services = self.services.clone();
        services.extend(config.auxiliary.iter().map(|aux| {
            Arc::new(CommandService::from_config(aux, self.settings.echo_output))
                as Arc<dyn AuxiliaryService>
        }));
        services
    }
}

impl WorkloadBackend for LocalWorkload {
    fn prepare(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.load()?;
            Ok(())
        })
    }

    fn identity(&self) -> String {
        self.prepared
            .as_ref()
            .map(|p| p.config.identity().to_string())
            .unwrap_or_default()
    }

    fn app_name(&self) -> String {
        self.prepared
            .as_ref()
            .map(|p| p.config.binary_name())
            .unwrap_or_else(|| "workload".to_string())
    }

    fn watch_paths(&self) -> Vec<PathBuf> {
        self.prepared
            .as_ref()
            .map(|p| p.config.watch.paths.clone())
            .unwrap_or_default()
    }

    fn ignored_extensions(&self) -> Vec<String> {
        self.prepared
            .as_ref()
            .map(|p| p.config.watch.ignored_extensions.clone())
            .unwrap_or_default()
    }

    fn binary_path(&self) -> PathBuf {
        self.prepared
            .as_ref()
            .map(|p| p.builder.binary_path())
            .unwrap_or_default()
    }

    fn is_initialized(&self) -> bool {
        self.prepared
            .as_ref()
            .is_some_and(|p| p.initializer.is_initialized())
    }

    fn set_host(&mut self, host: HostSection) {
        self.host_override = Some(host.clone());
        if let Some(prepared) = self.prepared.take() {
            let mut config = Config::clone(&prepared.config);
            config.host = host;
            self.prepared = Some(self.assemble(config));
        }
    }

    fn build<'a>(&'a mut self, cache: &'a ChecksumCache) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move { self.prepared()?.builder.build(cache).await })
    }

    fn initialize_fresh(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.prepared()?.initializer.initialize_fresh().await })
    }

    fn import_prior<'a>(&'a mut self, exported: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.prepared()?.initializer.import_prior(exported).await })
    }

    fn start(
        &mut self,
        cancel: CancellationToken,
        running: oneshot::Sender<()>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let prepared = self.prepared()?;
            let name = prepared.config.binary_name();
            let spec = prepared.driver.start(&prepared.config.host);

            let process = spawn_process(&name, &spec, self.settings.echo_output)?;
            let _ = running.send(());

            let mut supervisor = ProcessSupervisor::new(&cancel);
            // The workload exiting ends the session, auxiliaries included.
            let group = supervisor.token();
            supervisor.spawn(name, move |token| async move {
                let result = process.supervise(token).await;
                group.cancel();
                result
            });
            for service in self.auxiliary_services(&prepared.config) {
                info!(service = %service.name(), "starting auxiliary service");
                supervisor.spawn_auxiliary(service);
            }
            supervisor.wait().await
        })
    }

    fn export_state<'a>(&'a mut self, dest: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let state = self.prepared()?.commands.export().await?;
            self.fs.write(dest, state.as_bytes())?;
            info!(dest = ?dest, bytes = state.len(), "exported workload state");
            Ok(())
        })
    }
}
