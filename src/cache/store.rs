// src/cache/store.rs

//! Durable storage for recorded checksums, partitioned by namespace.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::info;

use crate::errors::Result;

/// namespace -> key -> hex checksum
pub type ChecksumMap = BTreeMap<String, BTreeMap<String, String>>;

/// Abstract storage for recorded checksums.
pub trait ChecksumStore: Send + Sync + Debug {
    fn load(&self, namespace: &str, key: &str) -> Result<Option<String>>;
    fn save(&self, namespace: &str, key: &str, checksum: &str) -> Result<()>;
    /// Forget every namespace.
    fn clear(&self) -> Result<()>;
}

/// Stores checksums in a JSON file, typically `<tool dir>/checksums.json`.
#[derive(Debug)]
pub struct FileChecksumStore {
    path: PathBuf,
    // Serializes read-modify-write of the file within this process.
    lock: Mutex<()>,
}

impl FileChecksumStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<ChecksumMap> {
        if !self.path.exists() {
            return Ok(ChecksumMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(ChecksumMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    /// Replace the file atomically: write a sibling temp file, then rename
    /// it over the store so readers never see a half-written document.
    fn write_all(&self, map: &ChecksumMap) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(map)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ChecksumStore for FileChecksumStore {
    fn load(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let map = self.read_all()?;
        Ok(map.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    fn save(&self, namespace: &str, key: &str, checksum: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut map = self.read_all()?;
        map.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), checksum.to_string());
        self.write_all(&map)?;
        info!(namespace, key, checksum, "stored checksum (file)");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(path = ?self.path, "cleared checksum cache (file)");
        Ok(())
    }
}

/// Stores checksums in memory only.
#[derive(Debug, Default)]
pub struct MemoryChecksumStore {
    map: Mutex<ChecksumMap>,
}

impl MemoryChecksumStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything stored so far.
    pub fn snapshot(&self) -> ChecksumMap {
        self.map.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl ChecksumStore for MemoryChecksumStore {
    fn load(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        Ok(map.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    fn save(&self, namespace: &str, key: &str, checksum: &str) -> Result<()> {
        self.map
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), checksum.to_string());
        info!(namespace, key, checksum, "stored checksum (memory)");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.map.lock().unwrap_or_else(|p| p.into_inner()).clear();
        Ok(())
    }
}
