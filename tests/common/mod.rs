#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use nodeserve::cache::{ChecksumCache, MemoryChecksumStore};
use nodeserve::config::exported_state_path;
use nodeserve::engine::{ControllerPaths, RefreshHandle, ServeController, ServeOptions};
use nodeserve::errors::Result;
use nodeserve::fs::{FileSystem, RealFileSystem};
use nodeserve_test_utils::fake_workload::FakeWorkload;
use nodeserve_test_utils::with_timeout;

pub use nodeserve_test_utils::init_tracing;

/// A temporary source tree with one watched file, an in-memory checksum
/// store and a recording fake workload.
pub struct Harness {
    _dir: TempDir,
    pub root: PathBuf,
    pub save_dir: PathBuf,
    pub config_path: PathBuf,
    pub store: Arc<MemoryChecksumStore>,
    pub cache: ChecksumCache,
    pub fake: FakeWorkload,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("src");
        std::fs::create_dir_all(root.join("app")).expect("create app dir");
        std::fs::write(root.join("app/app.go"), "package app\n").expect("write app.go");

        let config_path = root.join("nodeserve.toml");
        std::fs::write(&config_path, "[workload]\nname = \"fake\"\n").expect("write config");

        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let store = Arc::new(MemoryChecksumStore::new());
        let cache = ChecksumCache::new(store.clone(), Arc::clone(&fs), Vec::new());
        let fake = FakeWorkload::new(&root, fs);

        Self {
            save_dir: dir.path().join("local-chains"),
            _dir: dir,
            root,
            config_path,
            store,
            cache,
            fake,
        }
    }

    pub fn paths(&self, track_config: bool) -> ControllerPaths {
        ControllerPaths {
            source_root: self.root.clone(),
            config_path: track_config.then(|| self.config_path.clone()),
            save_dir: self.save_dir.clone(),
        }
    }

    pub fn controller(&self, options: ServeOptions) -> ServeController<FakeWorkload> {
        ServeController::new(self.fake.clone(), self.cache.clone(), self.paths(true), options)
    }

    pub fn exported(&self) -> PathBuf {
        exported_state_path(&self.save_dir, "fake-1")
    }

    pub fn write_source(&self, rel: &str, contents: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, contents).expect("write source");
    }

    pub fn serve_keys(&self) -> Vec<String> {
        self.store
            .snapshot()
            .get(nodeserve::cache::SERVE_NAMESPACE)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&nodeserve_test_utils::fake_workload::Call) -> bool) -> usize {
        self.fake.recording().count(pred)
    }
}

/// A controller running `run()` on a background task.
pub struct Running {
    pub refresh: RefreshHandle,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<(ServeController<FakeWorkload>, Result<()>)>,
}

impl Running {
    pub fn spawn(mut controller: ServeController<FakeWorkload>) -> Self {
        let refresh = controller.refresh_handle();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = controller.run(token).await;
            (controller, result)
        });
        Self {
            refresh,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) -> (ServeController<FakeWorkload>, Result<()>) {
        self.shutdown.cancel();
        with_timeout(self.task).await.expect("controller task panicked")
    }

    pub async fn finish(self) -> (ServeController<FakeWorkload>, Result<()>) {
        with_timeout(self.task).await.expect("controller task panicked")
    }
}

/// Poll `cond` every few milliseconds until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}
