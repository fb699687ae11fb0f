// src/lib.rs

pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod supervisor;
pub mod watch;
pub mod workload;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{ChecksumCache, FileChecksumStore, SERVE_NAMESPACE, SOURCE_CHECKSUM_KEY};
use crate::classify::{classify, Phase};
use crate::cli::{CacheArgs, CliArgs, Command, ServeArgs};
use crate::config::{
    checksum_store_path, load_and_validate, resolve_config_path, saved_state_dir, tool_dir,
    WatchSection,
};
use crate::engine::{ControllerPaths, ServeController, ServeOptions, WorkloadBackend};
use crate::errors::{Result, ServeError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::{spawn_watcher, WatchScope, WatcherHandle};
use crate::workload::{LocalWorkload, WorkloadSettings};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the tool directory and its checksum store
/// - the local workload backend
/// - the serve controller, file watcher and Ctrl-C handling, or one of the
///   one-shot commands
pub async fn run(args: CliArgs) -> Result<()> {
    let source_root = args.path.canonicalize().unwrap_or_else(|_| args.path.clone());
    let config_path = resolve_config_path(&source_root, args.config.as_deref());
    let tool = tool_dir();
    info!(root = ?source_root, config = ?config_path, tool = ?tool, "nodeserve starting");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let store = Arc::new(FileChecksumStore::new(checksum_store_path(&tool)));
    let cache = ChecksumCache::new(store, Arc::clone(&fs), Vec::new());

    let mut backend = LocalWorkload::new(
        WorkloadSettings {
            source_root: source_root.clone(),
            config_path: config_path.clone(),
            home: args.home.clone(),
            echo_output: true,
        },
        fs,
    );

    match args.command {
        Command::Serve(serve) => {
            clear_cache_if_requested(&cache, &serve.cache)?;
            let paths = ControllerPaths {
                source_root,
                config_path: Some(config_path),
                save_dir: saved_state_dir(&tool),
            };
            serve_forever(backend, cache, paths, &serve).await
        }
        Command::Build(opts) => {
            clear_cache_if_requested(&cache, &opts)?;
            let binary = build_once(&mut backend, &cache).await?;
            println!("[nodeserve] built {}", binary.display());
            Ok(())
        }
        Command::Init(opts) => {
            clear_cache_if_requested(&cache, &opts)?;
            init_once(&mut backend, &cache, &source_root).await
        }
        Command::Verify(opts) => {
            engine::verify(
                &mut backend,
                &cache,
                &source_root,
                Duration::from_secs(opts.timeout),
            )
            .await
        }
    }
}

fn clear_cache_if_requested(cache: &ChecksumCache, opts: &CacheArgs) -> Result<()> {
    if opts.clear_cache {
        cache.clear()?;
        println!("[nodeserve] checksum cache cleared");
    }
    Ok(())
}

async fn serve_forever(
    backend: LocalWorkload,
    cache: ChecksumCache,
    paths: ControllerPaths,
    serve: &ServeArgs,
) -> Result<()> {
    let options = ServeOptions {
        force_reset: serve.force_reset,
        reset_once: serve.reset_once,
    };
    let shutdown = CancellationToken::new();
    let mut controller = ServeController::new(backend, cache, paths.clone(), options);

    let watcher = start_watcher(&paths, &controller, shutdown.clone())?;

    // Ctrl-C → graceful shutdown; the running session exports its state
    // before the controller returns.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            println!("[nodeserve] shutting down");
            shutdown.cancel();
        });
    }

    serve_until(&mut controller, shutdown, watcher).await
}

/// Drive `controller` until `shutdown` fires, then collect the watcher's
/// outcome.
///
/// A failing watcher cancels `shutdown` itself, so the running session
/// still unwinds and exports before its error is returned.
pub async fn serve_until<B: WorkloadBackend>(
    controller: &mut ServeController<B>,
    shutdown: CancellationToken,
    watcher: WatcherHandle,
) -> Result<()> {
    let served = controller.run(shutdown).await;
    let watched = watcher.stop().await.map_err(ServeError::Other);
    served.and(watched)
}

/// Watch scope derived from the config as it is at startup. The config file
/// itself is always in scope, so edits to it are picked up.
fn start_watcher(
    paths: &ControllerPaths,
    controller: &ServeController<LocalWorkload>,
    shutdown: CancellationToken,
) -> Result<WatcherHandle> {
    let root = &paths.source_root;
    let (watch, output_dir) = match paths.config_path.as_deref().map(load_and_validate) {
        Some(Ok(config)) => (config.watch.clone(), Some(config.output_dir(root))),
        Some(Err(err)) => {
            warn!(error = %err, "config unreadable; watching default paths");
            (WatchSection::default(), None)
        }
        None => (WatchSection::default(), None),
    };

    let extra_files: Vec<PathBuf> = paths
        .config_path
        .iter()
        .filter_map(|p| relative_to(root, p))
        .collect();
    let exclude: Vec<PathBuf> = output_dir.iter().filter_map(|p| relative_to(root, p)).collect();

    let scope = WatchScope::new(&watch.paths, &extra_files, &exclude, watch.ignored_extensions)?;
    Ok(spawn_watcher(
        root,
        scope,
        controller.refresh_handle(),
        shutdown,
    )?)
}

fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

async fn build_once<B: WorkloadBackend>(backend: &mut B, cache: &ChecksumCache) -> Result<PathBuf> {
    backend
        .prepare()
        .await
        .map_err(|e| classify(Phase::Build, "workload", e))?;
    let app = backend.app_name();
    let cache = cache.with_ignored_extensions(backend.ignored_extensions());

    println!("[nodeserve] building {app}");
    backend
        .build(&cache)
        .await
        .map_err(|e| classify(Phase::Build, &app, e))
}

async fn init_once<B: WorkloadBackend>(
    backend: &mut B,
    cache: &ChecksumCache,
    source_root: &Path,
) -> Result<()> {
    backend
        .prepare()
        .await
        .map_err(|e| classify(Phase::Build, "workload", e))?;
    let app = backend.app_name();
    let scoped = cache.with_ignored_extensions(backend.ignored_extensions());

    let stale = !scoped.fs().is_file(&backend.binary_path())
        || scoped.has_changed(
            SERVE_NAMESPACE,
            SOURCE_CHECKSUM_KEY,
            source_root,
            &backend.watch_paths(),
        )?;
    if stale {
        build_once(backend, cache).await?;
    }

    println!("[nodeserve] initializing {app}");
    backend
        .initialize_fresh()
        .await
        .map_err(|e| classify(Phase::Init, &app, e))?;
    println!("[nodeserve] {app} initialized");
    Ok(())
}
