// src/watch/path_utils.rs

use std::path::Path;

/// `path` relative to `root` with forward slashes.
///
/// Falls back to comparing canonical forms, since notify may report a
/// different absolute prefix for the same directory (macOS `/private/var`).
/// Returns `None` for paths outside `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let to_str = |rel: &Path| rel.to_string_lossy().replace('\\', "/");

    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_str(rel));
    }

    let root = root.canonicalize().ok()?;
    // Removed files cannot be canonicalized; try their parent instead.
    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(_) => path.parent()?.canonicalize().ok()?.join(path.file_name()?),
    };
    canonical.strip_prefix(&root).ok().map(to_str)
}
