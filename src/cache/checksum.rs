// src/cache/checksum.rs

//! Content checksums over a set of files and directories.

use std::io::Read;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;

/// Whether `path`'s file name ends with one of `ignored_extensions`.
///
/// Extensions are compared as suffixes so multi-part ones like `pb.gw.go`
/// work.
pub fn has_ignored_extension(path: &Path, ignored_extensions: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    ignored_extensions.iter().any(|ext| {
        let ext = ext.trim_start_matches('.');
        !ext.is_empty()
            && name.len() > ext.len()
            && name.ends_with(ext)
            && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
    })
}

/// Every file under `root.join(p)` for each `p` in `paths`, sorted.
///
/// Paths that do not exist are skipped; a file path counts as itself.
pub fn collect_files<P: AsRef<Path>>(
    fs: &dyn FileSystem,
    root: &Path,
    paths: &[P],
    ignored_extensions: &[String],
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for rel in paths {
        let path = root.join(rel.as_ref());
        if fs.is_file(&path) {
            files.push(path);
        } else if fs.is_dir(&path) {
            walk(fs, &path, &mut files)?;
        }
    }

    files.retain(|f| !has_ignored_extension(f, ignored_extensions));
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(fs: &dyn FileSystem, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        if fs.is_dir(&entry) {
            walk(fs, &entry, out)?;
        } else if fs.is_file(&entry) {
            out.push(entry);
        }
    }
    Ok(())
}

/// Checksum of the concatenated content of all files under `paths`, taken in
/// sorted path order.
///
/// Returns `None` when the path set contains no files at all.
pub fn checksum_paths<P: AsRef<Path>>(
    fs: &dyn FileSystem,
    root: &Path,
    paths: &[P],
    ignored_extensions: &[String],
) -> Result<Option<String>> {
    let files = collect_files(fs, root, paths, ignored_extensions)?;
    if files.is_empty() {
        return Ok(None);
    }

    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    for file in &files {
        let mut reader = fs.open_read(file)?;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(root = ?root, files = files.len(), hash = %hash, "computed checksum");
    Ok(Some(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn ignored() -> Vec<String> {
        vec!["pb.go".to_string(), "pb.gw.go".to_string()]
    }

    #[test]
    fn ignored_extension_matches_whole_suffix() {
        let exts = ignored();
        assert!(has_ignored_extension(Path::new("x/query.pb.go"), &exts));
        assert!(has_ignored_extension(Path::new("x/query.pb.gw.go"), &exts));
        assert!(!has_ignored_extension(Path::new("x/keeper.go"), &exts));
        assert!(!has_ignored_extension(Path::new("x/notpb.go"), &exts));
    }

    #[test]
    fn generated_files_do_not_affect_checksum() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/x/keeper.go", "package x");
        let before = checksum_paths(&fs, Path::new("/src"), &["x"], &ignored()).unwrap();

        fs.add_file("/src/x/query.pb.go", "package x // generated");
        let after = checksum_paths(&fs, Path::new("/src"), &["x"], &ignored()).unwrap();

        assert!(before.is_some());
        assert_eq!(before, after);
    }

    #[test]
    fn missing_paths_are_skipped_and_empty_set_has_no_checksum() {
        let fs = MockFileSystem::new();
        fs.add_dir("/src");
        let sum = checksum_paths(&fs, Path::new("/src"), &["app", "cmd"], &ignored()).unwrap();
        assert_eq!(sum, None);
    }

    #[test]
    fn content_change_changes_checksum() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/app/app.go", "v1");
        let a = checksum_paths(&fs, Path::new("/src"), &["app"], &[]).unwrap();
        fs.add_file("/src/app/app.go", "v2");
        let b = checksum_paths(&fs, Path::new("/src"), &["app"], &[]).unwrap();
        assert_ne!(a, b);
    }
}
