// tests/local_workload.rs
//
// `LocalWorkload` against a real config file and, on Unix, a shell script
// standing in for the workload binary.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use nodeserve::config::DEFAULT_CONFIG_FILE;
use nodeserve::engine::WorkloadBackend;
use nodeserve::errors::ServeError;
use nodeserve::fs::RealFileSystem;
use nodeserve::workload::{LocalWorkload, WorkloadSettings};
use nodeserve_test_utils::builders::ConfigBuilder;

type TestResult = Result<(), Box<dyn Error>>;

fn workload(root: &Path, config: &ConfigBuilder) -> std::io::Result<LocalWorkload> {
    std::fs::write(root.join(DEFAULT_CONFIG_FILE), config.to_toml())?;
    Ok(LocalWorkload::new(
        WorkloadSettings {
            source_root: root.to_path_buf(),
            config_path: root.join(DEFAULT_CONFIG_FILE),
            home: Some(root.join("home")),
            echo_output: false,
        },
        Arc::new(RealFileSystem),
    ))
}

#[tokio::test]
async fn prepare_reads_the_config_each_time() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut w = workload(dir.path(), &ConfigBuilder::new("mars").watch_paths(&["x"]))?;

    w.prepare().await?;
    assert_eq!(w.identity(), "mars");
    assert_eq!(w.watch_paths(), vec![std::path::PathBuf::from("x")]);

    std::fs::write(
        dir.path().join(DEFAULT_CONFIG_FILE),
        ConfigBuilder::new("mars").id("mars-2").to_toml(),
    )?;
    w.prepare().await?;
    assert_eq!(w.identity(), "mars-2");
    Ok(())
}

#[tokio::test]
async fn invalid_config_surfaces_as_validation_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut w = workload(dir.path(), &ConfigBuilder::new("mars").without_accounts())?;

    let err = w.prepare().await.unwrap_err();
    assert!(matches!(err, ServeError::Validation(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn malformed_config_is_a_parse_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut w = workload(dir.path(), &ConfigBuilder::new("mars"))?;
    std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "[workload\nname = ")?;

    let err = w.prepare().await.unwrap_err();
    assert!(matches!(err, ServeError::Toml(_)), "{err:?}");
    Ok(())
}

#[cfg(unix)]
mod unix {
    use super::*;

    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    use nodeserve_test_utils::with_timeout;

    /// Installs `script` as the workload binary at `<root>/build/marsd`.
    fn install_binary(root: &Path, script: &str) -> std::io::Result<()> {
        let bin = root.join("build").join("marsd");
        std::fs::create_dir_all(bin.parent().unwrap())?;
        std::fs::write(&bin, format!("#!/bin/sh\n{script}\n"))?;
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    #[tokio::test]
    async fn start_runs_until_cancelled() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut w = workload(dir.path(), &ConfigBuilder::new("mars"))?;
        install_binary(dir.path(), "exec sleep 30")?;
        w.prepare().await?;

        let cancel = CancellationToken::new();
        let (running_tx, running_rx) = oneshot::channel();
        let stopper = cancel.clone();
        let stop = tokio::spawn(async move {
            if running_rx.await.is_ok() {
                tokio::time::sleep(Duration::from_millis(100)).await;
                stopper.cancel();
            }
        });

        let err = with_timeout(w.start(cancel, running_tx)).await.unwrap_err();
        assert!(err.is_cancelled(), "{err:?}");
        stop.await?;
        Ok(())
    }

    #[tokio::test]
    async fn workload_exit_status_and_stderr_are_reported() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut w = workload(dir.path(), &ConfigBuilder::new("mars"))?;
        install_binary(
            dir.path(),
            "echo 'listen tcp 0.0.0.0:26657: bind: address already in use' >&2\nexit 1",
        )?;
        w.prepare().await?;

        let (running_tx, _running_rx) = oneshot::channel();
        let err = with_timeout(w.start(CancellationToken::new(), running_tx))
            .await
            .unwrap_err();

        match err {
            ServeError::Process(failure) => {
                assert_eq!(failure.code, Some(1));
                assert!(failure.stderr_tail.contains("address already in use"));
            }
            other => panic!("expected process failure, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn failing_auxiliary_service_stops_the_workload() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config = ConfigBuilder::new("mars").auxiliary("faucet", "sleep 0.1; exit 3");
        let mut w = workload(dir.path(), &config)?;
        install_binary(dir.path(), "exec sleep 30")?;
        w.prepare().await?;

        let (running_tx, _running_rx) = oneshot::channel();
        let err = with_timeout(w.start(CancellationToken::new(), running_tx))
            .await
            .unwrap_err();

        match err {
            ServeError::Auxiliary { name, .. } => assert_eq!(name, "faucet"),
            other => panic!("expected auxiliary failure, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn export_writes_the_workload_output() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut w = workload(dir.path(), &ConfigBuilder::new("mars"))?;
        install_binary(dir.path(), "echo '{\"chain_id\":\"mars\"}'")?;
        w.prepare().await?;

        let dest = dir.path().join("saved/mars/exported_genesis.json");
        w.export_state(&dest).await?;

        assert_eq!(std::fs::read_to_string(dest)?.trim(), "{\"chain_id\":\"mars\"}");
        Ok(())
    }
}
