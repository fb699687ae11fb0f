// src/engine/backend.rs

//! Pluggable workload backend abstraction.
//!
//! The controller talks to a `WorkloadBackend` instead of running toolchain
//! and workload commands itself. Production code uses
//! [`crate::workload::LocalWorkload`]; tests provide a fake that records
//! calls and simulates a running process.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::cache::ChecksumCache;
use crate::config::HostSection;
use crate::errors::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait WorkloadBackend: Send {
    /// Reload configuration at the start of a cycle.
    fn prepare(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Identity keying the exported state snapshot.
    fn identity(&self) -> String;

    /// Human-readable name used in start failure messages.
    fn app_name(&self) -> String;

    /// Source paths (relative to the source root) that feed the build.
    fn watch_paths(&self) -> Vec<PathBuf>;

    fn ignored_extensions(&self) -> Vec<String>;

    /// Where the binary should be; may not exist yet.
    fn binary_path(&self) -> PathBuf;

    fn is_initialized(&self) -> bool;

    /// Replace the bind addresses used on the next start.
    fn set_host(&mut self, host: HostSection);

    fn build<'a>(&'a mut self, cache: &'a ChecksumCache) -> BoxFuture<'a, Result<PathBuf>>;

    fn initialize_fresh(&mut self) -> BoxFuture<'_, Result<()>>;

    fn import_prior<'a>(&'a mut self, exported: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// Run the workload (and its auxiliary services) until it exits or
    /// `cancel` fires.
    ///
    /// `running` is signalled once the workload process is up. After
    /// cancellation the future resolves to `Err(ServeError::Cancelled)`.
    fn start(
        &mut self,
        cancel: CancellationToken,
        running: oneshot::Sender<()>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Export the current state into `dest`.
    fn export_state<'a>(&'a mut self, dest: &'a Path) -> BoxFuture<'a, Result<()>>;
}
