// src/cache/mod.rs

//! Change detection backed by recorded content checksums.
//!
//! [`ChecksumCache::has_changed`] never writes; [`ChecksumCache::save`] is
//! called by the controller only once the step the change fed into has
//! succeeded, so a half-applied change is detected again next cycle.

pub mod checksum;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;

pub use checksum::{checksum_paths, collect_files, has_ignored_extension};
pub use store::{ChecksumStore, FileChecksumStore, MemoryChecksumStore};

/// Namespace for serve-time checks (source, binary, config).
pub const SERVE_NAMESPACE: &str = "serve.dirchange";
/// Namespace for build-time checks (dependency descriptor).
pub const BUILD_NAMESPACE: &str = "build.dirchange";

pub const SOURCE_CHECKSUM_KEY: &str = "source_checksum";
pub const BINARY_CHECKSUM_KEY: &str = "binary_checksum";
pub const CONFIG_CHECKSUM_KEY: &str = "config_checksum";
pub const GO_MOD_CHECKSUM_KEY: &str = "go_mod_checksum";

#[derive(Debug, Clone)]
pub struct ChecksumCache {
    store: Arc<dyn ChecksumStore>,
    fs: Arc<dyn FileSystem>,
    ignored_extensions: Arc<Vec<String>>,
}

impl ChecksumCache {
    pub fn new(
        store: Arc<dyn ChecksumStore>,
        fs: Arc<dyn FileSystem>,
        ignored_extensions: Vec<String>,
    ) -> Self {
        Self {
            store,
            fs,
            ignored_extensions: Arc::new(ignored_extensions),
        }
    }

    /// Same store and filesystem, different ignore list.
    pub fn with_ignored_extensions(&self, ignored_extensions: Vec<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            fs: Arc::clone(&self.fs),
            ignored_extensions: Arc::new(ignored_extensions),
        }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn checksum<P: AsRef<Path>>(&self, root: &Path, paths: &[P]) -> Result<Option<String>> {
        checksum_paths(self.fs.as_ref(), root, paths, &self.ignored_extensions)
    }

    /// Whether the files under `paths` differ from what was last saved for
    /// (`namespace`, `key`).
    ///
    /// A key that was never saved, or a path set with no files, counts as
    /// changed.
    pub fn has_changed<P: AsRef<Path>>(
        &self,
        namespace: &str,
        key: &str,
        root: &Path,
        paths: &[P],
    ) -> Result<bool> {
        let Some(stored) = self.store.load(namespace, key)? else {
            debug!(namespace, key, "no recorded checksum");
            return Ok(true);
        };
        let Some(current) = self.checksum(root, paths)? else {
            debug!(namespace, key, "no files to checksum");
            return Ok(true);
        };
        let changed = current != stored;
        debug!(namespace, key, changed, "compared checksum");
        Ok(changed)
    }

    /// Record the current checksum for (`namespace`, `key`), overwriting any
    /// previous value. A path set with no files records nothing.
    pub fn save<P: AsRef<Path>>(
        &self,
        namespace: &str,
        key: &str,
        root: &Path,
        paths: &[P],
    ) -> Result<()> {
        match self.checksum(root, paths)? {
            Some(sum) => self.store.save(namespace, key, &sum),
            None => {
                debug!(namespace, key, "nothing to record; path set has no files");
                Ok(())
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}
