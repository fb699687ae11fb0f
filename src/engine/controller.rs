// src/engine/controller.rs

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{
    ChecksumCache, BINARY_CHECKSUM_KEY, CONFIG_CHECKSUM_KEY, SERVE_NAMESPACE, SOURCE_CHECKSUM_KEY,
};
use crate::classify::{classify, ClassifiedError, Phase};
use crate::config::exported_state_path;
use crate::errors::{Result, ServeError};

use super::backend::WorkloadBackend;
use super::plan::{plan_cycle, CycleInputs, StateAction};
use super::refresh::{RefreshChannel, RefreshHandle};

/// Operator flags for one `serve` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeOptions {
    /// Reinitialize on every cycle.
    pub force_reset: bool,
    /// Reinitialize on the first cycle only.
    pub reset_once: bool,
}

/// Filesystem locations the controller needs besides the backend.
#[derive(Debug, Clone)]
pub struct ControllerPaths {
    pub source_root: PathBuf,
    /// The workload's config file; its checksum is only tracked when set.
    pub config_path: Option<PathBuf>,
    /// Root of the per-identity exported state snapshots.
    pub save_dir: PathBuf,
}

/// State carried across the cycles of one serve invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSession {
    pub force_reset: bool,
    pub reset_once: bool,
    /// The workload reached the running state in the current cycle.
    pub served: bool,
}

impl ServeSession {
    fn should_reset(&self) -> bool {
        self.force_reset || self.reset_once
    }
}

/// Owns the watch → build → init-or-reset → start → export cycle.
///
/// Exactly one cycle is in flight at a time: a refresh cancels the running
/// cycle and the next one starts only after the previous one has fully
/// unwound, including its state export.
pub struct ServeController<B: WorkloadBackend> {
    backend: B,
    cache: ChecksumCache,
    paths: ControllerPaths,
    session: ServeSession,
    refresh: RefreshChannel,
}

impl<B: WorkloadBackend> fmt::Debug for ServeController<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeController")
            .field("paths", &self.paths)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// What a cycle needs to record once the workload is running.
struct CycleChecksums {
    cache: ChecksumCache,
    source_root: PathBuf,
    watch_paths: Vec<PathBuf>,
    binary: PathBuf,
    config_path: Option<PathBuf>,
}

impl CycleChecksums {
    fn save(&self) -> Result<()> {
        if let Some(config) = &self.config_path {
            let (dir, file) = split_file(config);
            self.cache.save(SERVE_NAMESPACE, CONFIG_CHECKSUM_KEY, &dir, &[file])?;
        }
        self.cache.save(
            SERVE_NAMESPACE,
            SOURCE_CHECKSUM_KEY,
            &self.source_root,
            &self.watch_paths,
        )?;
        let (dir, file) = split_file(&self.binary);
        self.cache.save(SERVE_NAMESPACE, BINARY_CHECKSUM_KEY, &dir, &[file])?;
        Ok(())
    }
}

fn split_file(path: &Path) -> (PathBuf, PathBuf) {
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf());
    (dir, file)
}

/// Race `fut` against `cancel`; cancellation drops `fut` and any
/// subprocess it owns.
async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServeError::Cancelled),
        res = fut => res,
    }
}

impl<B: WorkloadBackend> ServeController<B> {
    pub fn new(backend: B, cache: ChecksumCache, paths: ControllerPaths, options: ServeOptions) -> Self {
        Self {
            backend,
            cache,
            paths,
            session: ServeSession {
                force_reset: options.force_reset,
                reset_once: options.reset_once,
                served: false,
            },
            refresh: RefreshChannel::new(),
        }
    }

    /// Handle for the watcher (or anything else) to request a refresh.
    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.handle()
    }

    pub fn session(&self) -> ServeSession {
        self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// The first cycle starts immediately. Build and init failures are
    /// reported and the controller waits for the next refresh; anything
    /// else ends the loop with an error.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!("serve controller started");
        self.refresh.handle().refresh();

        while self.refresh.recv(&shutdown).await {
            let session = self.refresh.begin_session(&shutdown);
            let result = self.serve_once(&session).await;

            match result {
                Ok(()) => {
                    println!("[nodeserve] workload exited; waiting for changes");
                }
                Err(ServeError::Cancelled) => {
                    debug!(served = self.session.served, "cycle cancelled");
                    if self.session.served {
                        self.session.served = false;
                        self.export_state().await?;
                    }
                }
                Err(ServeError::Classified(err)) if err.is_recoverable() => {
                    report_recoverable(&err);
                }
                Err(err) => return Err(err),
            }
        }

        info!("serve controller stopped");
        Ok(())
    }

    /// One build → init-or-reset → start pass, running until the workload
    /// exits or `session` is cancelled.
    pub async fn serve_once(&mut self, session: &CancellationToken) -> Result<()> {
        self.session.served = false;

        until_cancelled(session, self.backend.prepare())
            .await
            .map_err(|e| classify(Phase::Build, "workload", e))?;

        let app = self.backend.app_name();
        let cache = self
            .cache
            .with_ignored_extensions(self.backend.ignored_extensions());
        let fs = cache.fs().clone();

        let checksums = CycleChecksums {
            cache: cache.clone(),
            source_root: self.paths.source_root.clone(),
            watch_paths: self.backend.watch_paths(),
            binary: self.backend.binary_path(),
            config_path: self.paths.config_path.clone(),
        };

        let config_changed = match &checksums.config_path {
            Some(config) => {
                let (dir, file) = split_file(config);
                cache.has_changed(SERVE_NAMESPACE, CONFIG_CHECKSUM_KEY, &dir, &[file])?
            }
            None => false,
        };
        let source_changed = cache.has_changed(
            SERVE_NAMESPACE,
            SOURCE_CHECKSUM_KEY,
            &checksums.source_root,
            &checksums.watch_paths,
        )?;
        let binary_changed = if fs.is_file(&checksums.binary) {
            let (dir, file) = split_file(&checksums.binary);
            cache.has_changed(SERVE_NAMESPACE, BINARY_CHECKSUM_KEY, &dir, &[file])?
        } else {
            true
        };
        let exported = exported_state_path(&self.paths.save_dir, &self.backend.identity());

        let inputs = CycleInputs {
            initialized: self.backend.is_initialized(),
            force_reset: self.session.should_reset(),
            config_changed,
            source_changed,
            binary_changed,
            exported_state_exists: fs.is_file(&exported),
        };
        let plan = plan_cycle(inputs);
        info!(?inputs, ?plan, "planned serve cycle");

        if plan.build {
            println!("[nodeserve] building {app}");
            until_cancelled(session, self.backend.build(&cache))
                .await
                .map_err(|e| classify(Phase::Build, &app, e))?;
        }

        match plan.state {
            StateAction::InitializeFresh => {
                println!("[nodeserve] initializing {app}");
                until_cancelled(session, self.backend.initialize_fresh())
                    .await
                    .map_err(|e| classify(Phase::Init, &app, e))?;
            }
            StateAction::ResetAndImport => {
                println!("[nodeserve] resetting {app} and importing saved state");
                until_cancelled(session, self.backend.import_prior(&exported))
                    .await
                    .map_err(|e| classify(Phase::Init, &app, e))?;
            }
            StateAction::Resume => {
                debug!("resuming existing state");
            }
        }
        self.session.reset_once = false;

        println!("[nodeserve] starting {app}");
        let (running_tx, mut running_rx) = oneshot::channel();
        let mut start = self.backend.start(session.clone(), running_tx);
        let mut awaiting_running = true;

        let result = loop {
            tokio::select! {
                biased;
                signal = &mut running_rx, if awaiting_running => {
                    awaiting_running = false;
                    if signal.is_ok() {
                        self.session.served = true;
                        info!(app = %app, "workload running");
                        if let Err(err) = checksums.save() {
                            session.cancel();
                            let _ = (&mut start).await;
                            return Err(err);
                        }
                    }
                }
                res = &mut start => break res,
            }
        };

        result.map_err(|e| classify(Phase::Start, &app, e))
    }

    /// Save the running workload's state for the next cycle to import.
    ///
    /// A failed export ends the serve loop: carrying on would reinitialize
    /// the workload next cycle and lose the state being protected.
    async fn export_state(&mut self) -> Result<()> {
        let dest = exported_state_path(&self.paths.save_dir, &self.backend.identity());
        println!("[nodeserve] saving workload state to {}", dest.display());
        self.backend.export_state(&dest).await.map_err(|err| {
            warn!(error = %err, dest = ?dest, "state export failed");
            ServeError::Other(anyhow::anyhow!(
                "could not export workload state to {}: {err}",
                dest.display()
            ))
        })
    }
}

fn report_recoverable(err: &ClassifiedError) {
    println!("[nodeserve] {err}");
    if let Some(hint) = err.remediation() {
        println!("[nodeserve] {hint}");
    }
    println!("[nodeserve] waiting for a fix before retrying; save a watched file to rebuild");
}
