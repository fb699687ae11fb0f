// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::cache::checksum::has_ignored_extension;

/// Which relative paths under the source root should trigger a refresh.
///
/// A path is in scope when it sits under one of the watch paths (or is one
/// of the extra files, such as the config file), has no hidden component,
/// does not end in an ignored extension and is not under an excluded
/// directory.
#[derive(Clone)]
pub struct WatchScope {
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
    ignored_extensions: Vec<String>,
}

impl fmt::Debug for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchScope")
            .field("patterns", &self.watch_set.len())
            .field("ignored_extensions", &self.ignored_extensions)
            .finish_non_exhaustive()
    }
}

impl WatchScope {
    /// Build a scope from root-relative watch paths and files.
    ///
    /// Each watch path matches itself and everything beneath it, so both
    /// directories and single files work.
    pub fn new(
        watch_paths: &[PathBuf],
        extra_files: &[PathBuf],
        exclude_dirs: &[PathBuf],
        ignored_extensions: Vec<String>,
    ) -> Result<Self> {
        let mut watch = Vec::new();
        for path in watch_paths {
            let base = glob_base(path);
            if base.is_empty() {
                watch.push("**".to_string());
            } else {
                watch.push(base.clone());
                watch.push(format!("{base}/**"));
            }
        }
        watch.extend(extra_files.iter().map(|p| glob_base(p)).filter(|p| !p.is_empty()));

        let exclude: Vec<String> = exclude_dirs
            .iter()
            .map(|p| glob_base(p))
            .filter(|p| !p.is_empty())
            .flat_map(|p| [format!("{p}/**"), p])
            .collect();

        let watch_set = build_globset(&watch).context("building watch globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(&exclude).context("building exclude globset")?)
        };

        Ok(Self {
            watch_set,
            exclude_set,
            ignored_extensions,
        })
    }

    /// `rel_path` uses forward slashes, e.g. `"x/mars/keeper/msg.go"`.
    pub fn matches(&self, rel_path: &str) -> bool {
        if rel_path.is_empty() || rel_path.split('/').any(|part| part.starts_with('.')) {
            return false;
        }
        if has_ignored_extension(Path::new(rel_path), &self.ignored_extensions) {
            return false;
        }
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        match &self.exclude_set {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }
}

/// Root-relative path as a literal glob prefix.
fn glob_base(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    let s = s.trim_start_matches("./").trim_end_matches('/');
    if s == "." {
        return String::new();
    }
    globset::escape(s)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> WatchScope {
        WatchScope::new(
            &[PathBuf::from("app"), PathBuf::from("x"), PathBuf::from("./proto/")],
            &[PathBuf::from("nodeserve.toml")],
            &[PathBuf::from("x/generated")],
            vec!["pb.go".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn watch_paths_match_recursively() {
        let s = scope();
        assert!(s.matches("app/app.go"));
        assert!(s.matches("x/mars/keeper/msg.go"));
        assert!(s.matches("proto/mars/tx.proto"));
        assert!(s.matches("nodeserve.toml"));
    }

    #[test]
    fn paths_outside_scope_do_not_match() {
        let s = scope();
        assert!(!s.matches("README.md"));
        assert!(!s.matches("application/main.go"));
        assert!(!s.matches("build/marsd"));
        assert!(!s.matches(""));
    }

    #[test]
    fn hidden_ignored_and_excluded_paths_are_skipped() {
        let s = scope();
        assert!(!s.matches("app/.app.go.swp"));
        assert!(!s.matches("x/.cache/file.go"));
        assert!(!s.matches("x/mars/types/tx.pb.go"));
        assert!(!s.matches("x/generated/code.go"));
    }

    #[test]
    fn root_watch_path_matches_everything_visible() {
        let s = WatchScope::new(&[PathBuf::from(".")], &[], &[], Vec::new()).unwrap();
        assert!(s.matches("main.go"));
        assert!(s.matches("cmd/marsd/main.go"));
        assert!(!s.matches(".git/HEAD"));
    }
}
