// src/engine/verify.rs

//! Dry-run variant: build, bootstrap and start once under a deadline.
//!
//! This is the only place the engine bounds a phase with a timeout. The
//! workload is considered healthy as soon as its API port accepts a TCP
//! connection.

use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backend::WorkloadBackend;
use crate::cache::{ChecksumCache, SERVE_NAMESPACE, SOURCE_CHECKSUM_KEY};
use crate::classify::{classify, Phase, RunMode};
use crate::config::HostSection;
use crate::errors::{Result, ServeError};

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(60);
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Reserve `n` distinct free local ports.
///
/// All listeners stay open until every port is picked, so the ports differ.
pub fn free_ports(n: usize) -> Result<Vec<u16>> {
    let listeners = (0..n)
        .map(|_| TcpListener::bind("127.0.0.1:0"))
        .collect::<std::io::Result<Vec<_>>>()?;
    let mut ports = Vec::with_capacity(n);
    for listener in &listeners {
        ports.push(listener.local_addr()?.port());
    }
    Ok(ports)
}

/// Host addresses on free loopback ports.
pub fn local_host() -> Result<HostSection> {
    let ports = free_ports(6)?;
    let addr = |port: u16| format!("127.0.0.1:{port}");
    Ok(HostSection {
        rpc: addr(ports[0]),
        p2p: addr(ports[1]),
        prof: addr(ports[2]),
        grpc: addr(ports[3]),
        grpc_web: addr(ports[4]),
        api: addr(ports[5]),
    })
}

async fn is_listening(addr: SocketAddr) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

enum StartOutcome {
    Listening,
    Exited(Result<()>),
}

/// Check that the workload builds, bootstraps and starts listening within
/// `deadline`.
pub async fn verify<B: WorkloadBackend>(
    backend: &mut B,
    cache: &ChecksumCache,
    source_root: &Path,
    deadline: Duration,
) -> Result<()> {
    backend
        .prepare()
        .await
        .map_err(|e| classify(Phase::Build, "workload", e))?;
    let app = backend.app_name();
    let cache = cache.with_ignored_extensions(backend.ignored_extensions());

    let host = local_host()?;
    let api: SocketAddr = host
        .api
        .parse()
        .map_err(|e| ServeError::Config(format!("invalid api address {}: {e}", host.api)))?;
    backend.set_host(host);

    let needs_build = !cache.fs().is_file(&backend.binary_path())
        || cache.has_changed(
            SERVE_NAMESPACE,
            SOURCE_CHECKSUM_KEY,
            source_root,
            &backend.watch_paths(),
        )?;
    if needs_build {
        println!("[nodeserve] building {app}");
        backend
            .build(&cache)
            .await
            .map_err(|e| classify(Phase::Build, &app, e))?;
    }

    println!("[nodeserve] initializing {app}");
    backend
        .initialize_fresh()
        .await
        .map_err(|e| classify(Phase::Init, &app, e))?;

    println!("[nodeserve] starting {app}; waiting up to {}s for {api}", deadline.as_secs());
    let cancel = CancellationToken::new();
    let (running_tx, _running_rx) = oneshot::channel();
    let mut start = backend.start(cancel.clone(), running_tx);

    let outcome = tokio::time::timeout(deadline, async {
        let mut ticker = tokio::time::interval(PROBE_INTERVAL);
        loop {
            tokio::select! {
                res = &mut start => return StartOutcome::Exited(res),
                _ = ticker.tick() => {
                    if is_listening(api).await {
                        return StartOutcome::Listening;
                    }
                    debug!(%api, "workload not listening yet");
                }
            }
        }
    })
    .await;

    match outcome {
        Ok(StartOutcome::Listening) => {
            info!(%api, "workload is listening");
            cancel.cancel();
            let _ = start.await;
            println!("[nodeserve] {app} started successfully");
            Ok(())
        }
        Ok(StartOutcome::Exited(Ok(()))) => Err(ServeError::Other(anyhow!(
            "{app} exited before it started listening on {api}"
        ))),
        Ok(StartOutcome::Exited(Err(err))) => {
            let err = classify(Phase::Start, &app, err);
            let accepted = matches!(
                &err,
                ServeError::Classified(classified)
                    if classified
                        .start_kind()
                        .is_some_and(|kind| kind.is_acceptable_in(RunMode::Verify))
            );
            if accepted {
                info!(error = %err, "start failure accepted during verification");
                println!("[nodeserve] {app} started (no validators registered)");
                Ok(())
            } else {
                Err(err)
            }
        }
        Err(_) => {
            cancel.cancel();
            let _ = start.await;
            Err(ServeError::Other(anyhow!(
                "{app} did not start listening on {api} within {}s",
                deadline.as_secs()
            )))
        }
    }
}
