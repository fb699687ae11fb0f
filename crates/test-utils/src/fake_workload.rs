use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use nodeserve::cache::ChecksumCache;
use nodeserve::config::HostSection;
use nodeserve::engine::{BoxFuture, WorkloadBackend};
use nodeserve::errors::{Result, ServeError};
use nodeserve::exec::ProcessFailure;
use nodeserve::fs::FileSystem;

/// One call into the fake backend, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Prepare,
    Build,
    InitializeFresh,
    ImportPrior(PathBuf),
    Start,
    Stop,
    Export(PathBuf),
}

/// Knobs controlling how the fake behaves.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    pub build_delay: Duration,
    /// Build fails with this stderr.
    pub build_stderr: Option<String>,
    /// Bootstrap fails as if genesis validation rejected it.
    pub fail_validation: bool,
    /// The workload exits right after starting with this stderr.
    pub start_stderr: Option<String>,
    /// The workload exits cleanly after this long.
    pub exit_after: Option<Duration>,
    /// `export` fails instead of writing a snapshot.
    pub fail_export: bool,
}

/// Everything the fake saw.
#[derive(Debug, Default)]
pub struct Recording {
    pub calls: Vec<Call>,
    /// `(started, finished)` per build.
    pub builds: Vec<(Instant, Instant)>,
    pub running: usize,
    pub max_running: usize,
    /// A build or init ran while a workload was still running.
    pub overlapped: bool,
    pub initialized: bool,
}

impl Recording {
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(*c)).count()
    }
}

/// A `WorkloadBackend` that records calls instead of running toolchains.
///
/// It writes a small fake binary under `<root>/build/faked` and exported
/// state through the provided filesystem, so the controller's checksum and
/// snapshot logic run for real.
#[derive(Debug, Clone)]
pub struct FakeWorkload {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    behaviour: Arc<Mutex<Behaviour>>,
    recording: Arc<Mutex<Recording>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl FakeWorkload {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            behaviour: Arc::new(Mutex::new(Behaviour::default())),
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *lock(&self.behaviour) = behaviour;
    }

    pub fn update_behaviour(&self, f: impl FnOnce(&mut Behaviour)) {
        f(&mut lock(&self.behaviour));
    }

    pub fn recording(&self) -> MutexGuard<'_, Recording> {
        lock(&self.recording)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.recording().calls.clone()
    }

    pub fn mark_initialized(&self) {
        self.recording().initialized = true;
    }

    fn record(&self, call: Call) {
        let mut rec = self.recording();
        if matches!(call, Call::Build | Call::InitializeFresh | Call::ImportPrior(_))
            && rec.running > 0
        {
            rec.overlapped = true;
        }
        rec.calls.push(call);
    }

    fn behaviour(&self) -> Behaviour {
        lock(&self.behaviour).clone()
    }
}

fn process_failure(command: &str, stderr: &str) -> ServeError {
    ServeError::Process(ProcessFailure {
        command: command.to_string(),
        code: Some(1),
        stderr_tail: stderr.to_string(),
    })
}

impl WorkloadBackend for FakeWorkload {
    fn prepare(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record(Call::Prepare);
            Ok(())
        })
    }

    fn identity(&self) -> String {
        "fake-1".to_string()
    }

    fn app_name(&self) -> String {
        "faked".to_string()
    }

    fn watch_paths(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("app")]
    }

    fn ignored_extensions(&self) -> Vec<String> {
        vec!["pb.go".to_string()]
    }

    fn binary_path(&self) -> PathBuf {
        self.root.join("build").join("faked")
    }

    fn is_initialized(&self) -> bool {
        self.recording().initialized
    }

    fn set_host(&mut self, _host: HostSection) {}

    fn build<'a>(&'a mut self, _cache: &'a ChecksumCache) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            self.record(Call::Build);
            let behaviour = self.behaviour();
            let started = Instant::now();
            tokio::time::sleep(behaviour.build_delay).await;

            if let Some(stderr) = behaviour.build_stderr {
                return Err(process_failure("go build", &stderr));
            }
            let binary = self.binary_path();
            self.fs.write(&binary, b"fake binary")?;
            self.recording().builds.push((started, Instant::now()));
            Ok(binary)
        })
    }

    fn initialize_fresh(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record(Call::InitializeFresh);
            if self.behaviour().fail_validation {
                self.recording().initialized = false;
                return Err(ServeError::Validation("genesis is invalid".to_string()));
            }
            self.recording().initialized = true;
            Ok(())
        })
    }

    fn import_prior<'a>(&'a mut self, exported: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(Call::ImportPrior(exported.to_path_buf()));
            self.fs.read_to_string(exported)?;
            self.recording().initialized = true;
            Ok(())
        })
    }

    fn start(
        &mut self,
        cancel: CancellationToken,
        running: oneshot::Sender<()>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let behaviour = self.behaviour();
            {
                let mut rec = self.recording();
                rec.calls.push(Call::Start);
                rec.running += 1;
                rec.max_running = rec.max_running.max(rec.running);
            }
            let _ = running.send(());

            let result = if let Some(stderr) = behaviour.start_stderr {
                tokio::task::yield_now().await;
                Err(process_failure("faked start", &stderr))
            } else {
                let exit = async {
                    match behaviour.exit_after {
                        Some(after) => tokio::time::sleep(after).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => Err(ServeError::Cancelled),
                    _ = exit => Ok(()),
                }
            };

            let mut rec = self.recording();
            rec.running -= 1;
            rec.calls.push(Call::Stop);
            result
        })
    }

    fn export_state<'a>(&'a mut self, dest: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(Call::Export(dest.to_path_buf()));
            if self.behaviour().fail_export {
                return Err(ServeError::Process(ProcessFailure {
                    command: "faked export".to_string(),
                    code: Some(1),
                    stderr_tail: "Error: store is locked".to_string(),
                }));
            }
            let n = self.recording().count(|c| matches!(c, Call::Export(_)));
            self.fs
                .write(dest, format!("{{\"export\":{n}}}").as_bytes())?;
            Ok(())
        })
    }
}
