// src/workload/entrypoint.rs

//! Locating the workload's main package in the source tree.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{Result, ServeError};
use crate::fs::FileSystem;

const SKIPPED_DIRS: &[&str] = &["vendor", "node_modules", "testdata"];

/// Find the single directory under `root` holding a `package main` source file.
///
/// `exclude` (typically the build output directory) is never descended into.
/// Returns the directory relative to `root`.
pub fn discover_main(fs: &dyn FileSystem, root: &Path, exclude: &[PathBuf]) -> Result<PathBuf> {
    let mut found = Vec::new();
    scan(fs, root, exclude, &mut found)?;
    found.sort();

    let mut found: Vec<PathBuf> = found
        .into_iter()
        .map(|dir| dir.strip_prefix(root).map(Path::to_path_buf).unwrap_or(dir))
        .collect();

    match found.len() {
        0 => Err(ServeError::NoEntryPoint(root.to_path_buf())),
        1 => {
            let main = found.remove(0);
            debug!(main = ?main, "discovered main package");
            Ok(main)
        }
        _ => Err(ServeError::AmbiguousEntryPoint(found)),
    }
}

fn scan(fs: &dyn FileSystem, dir: &Path, exclude: &[PathBuf], found: &mut Vec<PathBuf>) -> Result<()> {
    let mut has_main = false;
    for entry in fs.read_dir(dir)? {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if fs.is_dir(&entry) {
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name) || exclude.contains(&entry) {
                continue;
            }
            scan(fs, &entry, exclude, found)?;
        } else if !has_main
            && name.ends_with(".go")
            && !name.ends_with("_test.go")
            && declares_package_main(&fs.read_to_string(&entry)?)
        {
            has_main = true;
        }
    }

    if has_main {
        found.push(dir.to_path_buf());
    }
    Ok(())
}

fn declares_package_main(source: &str) -> bool {
    source.lines().map(str::trim).any(|line| {
        line.strip_prefix("package")
            .map(|rest| rest.split_whitespace().next() == Some("main"))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn finds_single_main_package() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/app/app.go", "package app\n");
        fs.add_file("/src/cmd/marsd/main.go", "// entry\npackage main\n\nfunc main() {}\n");
        fs.add_file("/src/cmd/marsd/main_test.go", "package main\n");

        let main = discover_main(&fs, Path::new("/src"), &[]).unwrap();
        assert_eq!(main, PathBuf::from("cmd/marsd"));
    }

    #[test]
    fn skips_vendor_hidden_and_excluded_dirs() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/cmd/marsd/main.go", "package main\n");
        fs.add_file("/src/vendor/tool/main.go", "package main\n");
        fs.add_file("/src/.cache/x/main.go", "package main\n");
        fs.add_file("/src/build/gen/main.go", "package main\n");

        let main = discover_main(&fs, Path::new("/src"), &[PathBuf::from("/src/build")]).unwrap();
        assert_eq!(main, PathBuf::from("cmd/marsd"));
    }

    #[test]
    fn multiple_mains_are_ambiguous() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/cmd/marsd/main.go", "package main\n");
        fs.add_file("/src/cmd/tool/main.go", "package main\n");

        match discover_main(&fs, Path::new("/src"), &[]) {
            Err(ServeError::AmbiguousEntryPoint(paths)) => {
                assert_eq!(paths, vec![PathBuf::from("cmd/marsd"), PathBuf::from("cmd/tool")]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn no_main_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/app/app.go", "package app\n");
        assert!(matches!(
            discover_main(&fs, Path::new("/src"), &[]),
            Err(ServeError::NoEntryPoint(_))
        ));
    }
}
