// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration as read from `nodeserve.toml`.
///
/// ```toml
/// [workload]
/// name = "mars"
///
/// [validator]
/// name = "alice"
/// staked = "100000000stake"
///
/// [[accounts]]
/// name = "alice"
/// coins = ["20000token", "200000000stake"]
///
/// [init.app]
/// minimum-gas-prices = "0stake"
///
/// [genesis.app_state.staking.params]
/// bond_denom = "stake"
/// ```
///
/// Everything except `workload.name`, `validator.name` and at least one
/// account has a default. Validation happens in [`Config::try_from`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    pub workload: WorkloadSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub host: HostSection,

    #[serde(default)]
    pub validator: ValidatorSection,

    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// Overlays for the three workload config files written at bootstrap.
    #[serde(default)]
    pub init: InitOverlays,

    /// Overlay for the bootstrap state document.
    #[serde(default)]
    pub genesis: toml::Table,

    #[serde(default)]
    pub auxiliary: Vec<AuxiliaryConfig>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub workload: WorkloadSection,
    pub watch: WatchSection,
    pub host: HostSection,
    pub validator: ValidatorSection,
    pub accounts: Vec<AccountConfig>,
    pub init: InitOverlays,
    pub genesis: toml::Table,
    pub auxiliary: Vec<AuxiliaryConfig>,
}

impl Config {
    /// Construct without validating. Prefer `Config::try_from(raw)`.
    pub fn new_unchecked(raw: RawConfig) -> Self {
        Self {
            workload: raw.workload,
            watch: raw.watch,
            host: raw.host,
            validator: raw.validator,
            accounts: raw.accounts,
            init: raw.init,
            genesis: raw.genesis,
            auxiliary: raw.auxiliary,
        }
    }

    /// Workload identity: keys the exported-state directory and is forced as
    /// the bootstrap state's `chain_id`.
    pub fn identity(&self) -> &str {
        self.workload
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.workload.name)
    }

    pub fn binary_name(&self) -> String {
        match &self.workload.binary {
            Some(bin) if !bin.is_empty() => bin.clone(),
            _ => format!("{}d", self.workload.name),
        }
    }

    /// The workload's own data directory.
    pub fn home_dir(&self) -> PathBuf {
        match &self.workload.home {
            Some(home) => expand_home(home),
            None => {
                let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
                base.join(format!(".{}", self.workload.name))
            }
        }
    }

    /// Directory the compiled binary is written to.
    pub fn output_dir(&self, source_root: &Path) -> PathBuf {
        match &self.workload.output {
            Some(out) if out.is_absolute() => out.clone(),
            Some(out) => source_root.join(out),
            None => source_root.join("build"),
        }
    }

    pub fn binary_path(&self, source_root: &Path) -> PathBuf {
        self.output_dir(source_root).join(self.binary_name())
    }
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Which driver speaks to the workload binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadFamily {
    #[default]
    Stargate,
}

/// `[workload]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadSection {
    #[serde(default)]
    pub name: String,

    /// Identity; defaults to `name`.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub family: WorkloadFamily,

    /// Binary name; defaults to `<name>d`.
    #[serde(default)]
    pub binary: Option<String>,

    /// Explicit main package path, relative to the source root.
    #[serde(default)]
    pub main: Option<PathBuf>,

    /// Extra `-X` style flags appended to the linker flags.
    #[serde(default)]
    pub ldflags: Vec<String>,

    #[serde(default)]
    pub home: Option<PathBuf>,

    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default = "default_toolchain")]
    pub toolchain: String,

    #[serde(default = "default_keyring_backend")]
    pub keyring_backend: String,
}

fn default_toolchain() -> String {
    "go".to_string()
}

fn default_keyring_backend() -> String {
    "test".to_string()
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            id: None,
            family: WorkloadFamily::default(),
            binary: None,
            main: None,
            ldflags: Vec::new(),
            home: None,
            output: None,
            toolchain: default_toolchain(),
            keyring_backend: default_keyring_backend(),
        }
    }
}

/// `[watch]` section: scopes both checksums and file-watch subscriptions.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    #[serde(default = "default_watch_paths")]
    pub paths: Vec<PathBuf>,

    #[serde(default = "default_ignored_extensions")]
    pub ignored_extensions: Vec<String>,
}

fn default_watch_paths() -> Vec<PathBuf> {
    ["app", "cmd", "x", "proto", "third_party"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

fn default_ignored_extensions() -> Vec<String> {
    vec!["pb.go".to_string(), "pb.gw.go".to_string()]
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            paths: default_watch_paths(),
            ignored_extensions: default_ignored_extensions(),
        }
    }
}

/// `[host]` section: bind addresses handed to the workload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HostSection {
    pub rpc: String,
    pub p2p: String,
    pub prof: String,
    pub grpc: String,
    pub grpc_web: String,
    pub api: String,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            rpc: "0.0.0.0:26657".to_string(),
            p2p: "0.0.0.0:26656".to_string(),
            prof: "0.0.0.0:6060".to_string(),
            grpc: "0.0.0.0:9090".to_string(),
            grpc_web: "0.0.0.0:9091".to_string(),
            api: "0.0.0.0:1317".to_string(),
        }
    }
}

/// `[validator]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorSection {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_staked")]
    pub staked: String,
}

fn default_staked() -> String {
    "100000000stake".to_string()
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            staked: default_staked(),
        }
    }
}

/// One `[[accounts]]` entry funded in the bootstrap state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub name: String,

    #[serde(default)]
    pub coins: Vec<String>,

    /// Fund this address directly instead of generating a key.
    #[serde(default)]
    pub address: Option<String>,

    /// Recover the key from this mnemonic instead of generating one.
    #[serde(default)]
    pub mnemonic: Option<String>,
}

/// `[init.app]`, `[init.client]` and `[init.config]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitOverlays {
    #[serde(default)]
    pub app: toml::Table,

    #[serde(default)]
    pub client: toml::Table,

    #[serde(default)]
    pub config: toml::Table,
}

/// One `[[auxiliary]]` service, run as a shell command beside the workload.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuxiliaryConfig {
    pub name: String,
    pub cmd: String,
}
