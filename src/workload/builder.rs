// src/workload/builder.rs

//! Compiling the workload binary with the external toolchain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::entrypoint::discover_main;
use crate::cache::{ChecksumCache, BUILD_NAMESPACE, GO_MOD_CHECKSUM_KEY};
use crate::errors::Result;
use crate::exec::{run_captured, CommandSpec};
use crate::fs::FileSystem;

/// Package the version identifiers are linked into.
const VERSION_PACKAGE: &str = "github.com/cosmos/cosmos-sdk/version";

/// Identifiers embedded into the binary at link time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildIdentity {
    pub name: String,
    pub app_name: String,
    pub version: String,
    pub commit: String,
    pub chain_id: String,
}

/// Everything the builder needs to know about one workload.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub toolchain: String,
    pub source_root: PathBuf,
    pub output_dir: PathBuf,
    pub binary_name: String,
    /// Explicit main package, relative to the source root.
    pub main: Option<PathBuf>,
    pub extra_ldflags: Vec<String>,
    pub name: String,
    pub chain_id: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    settings: BuildSettings,
    fs: Arc<dyn FileSystem>,
}

impl ArtifactBuilder {
    pub fn new(settings: BuildSettings, fs: Arc<dyn FileSystem>) -> Self {
        Self { settings, fs }
    }

    pub fn binary_path(&self) -> PathBuf {
        self.settings.output_dir.join(&self.settings.binary_name)
    }

    fn toolchain(&self) -> CommandSpec {
        CommandSpec::new(&self.settings.toolchain).current_dir(&self.settings.source_root)
    }

    /// `go mod tidy`
    pub async fn tidy_dependencies(&self) -> Result<()> {
        run_captured(&self.toolchain().args(["mod", "tidy"])).await?;
        Ok(())
    }

    /// `go mod verify`
    pub async fn verify_dependencies(&self) -> Result<()> {
        run_captured(&self.toolchain().args(["mod", "verify"])).await?;
        Ok(())
    }

    /// Resolve dependencies, then compile into the output directory.
    ///
    /// Dependency verification only runs when `go.mod` changed since the last
    /// verified build. Returns the path of the produced binary.
    pub async fn build(&self, cache: &ChecksumCache) -> Result<PathBuf> {
        let root = &self.settings.source_root;

        self.tidy_dependencies().await?;

        if cache.has_changed(BUILD_NAMESPACE, GO_MOD_CHECKSUM_KEY, root, &["go.mod"])? {
            info!("go.mod changed; verifying dependencies");
            self.verify_dependencies().await?;
            cache.save(BUILD_NAMESPACE, GO_MOD_CHECKSUM_KEY, root, &["go.mod"])?;
        }

        let main = match &self.settings.main {
            Some(main) => main.clone(),
            None => discover_main(
                self.fs.as_ref(),
                root,
                std::slice::from_ref(&self.settings.output_dir),
            )?,
        };

        let identity = BuildIdentity {
            name: self.settings.name.clone(),
            app_name: self.settings.binary_name.clone(),
            version: git_output(root, &["describe", "--tags"]).await,
            commit: git_output(root, &["rev-parse", "HEAD"]).await,
            chain_id: self.settings.chain_id.clone(),
        };
        let flags = ldflags(&identity, &self.settings.extra_ldflags);

        self.fs.create_dir_all(&self.settings.output_dir)?;
        let binary = self.binary_path();
        let spec = self
            .toolchain()
            .args(["build", "-mod=readonly", "-ldflags"])
            .arg(flags)
            .arg("-o")
            .arg(binary.as_os_str())
            .arg(package_arg(&main));
        run_captured(&spec).await?;

        info!(binary = ?binary, "built workload binary");
        Ok(binary)
    }
}

/// Linker flags: the operator's own first, then the version identifiers.
pub fn ldflags(identity: &BuildIdentity, extra: &[String]) -> String {
    let mut flags: Vec<String> = extra.to_vec();
    flags.push(format!("-X {VERSION_PACKAGE}.Name={}", identity.name));
    flags.push(format!("-X {VERSION_PACKAGE}.AppName={}", identity.app_name));
    flags.push(format!("-X {VERSION_PACKAGE}.Version={}", identity.version));
    flags.push(format!("-X {VERSION_PACKAGE}.Commit={}", identity.commit));
    flags.push(format!("-X main.ChainID={}", identity.chain_id));
    flags.join(" ")
}

/// Go wants local packages spelled `./path`.
fn package_arg(main: &Path) -> String {
    if main.is_absolute() {
        return main.display().to_string();
    }
    let rel = main.display().to_string();
    if rel.is_empty() || rel == "." {
        ".".to_string()
    } else if rel.starts_with("./") {
        rel
    } else {
        format!("./{rel}")
    }
}

/// Trimmed stdout of a git command, or empty if git is unavailable or fails.
async fn git_output(root: &Path, args: &[&str]) -> String {
    let spec = CommandSpec::new("git").args(args.iter().copied()).current_dir(root);
    match run_captured(&spec).await {
        Ok(out) => out.stdout.trim().to_string(),
        Err(e) => {
            debug!(error = %e, "git metadata unavailable");
            String::new()
        }
    }
}
