// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Config, RawConfig};
use crate::errors::Result;

/// File name looked up in the source root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "nodeserve.toml";

/// Load a configuration file and return the raw, unvalidated [`RawConfig`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file and validate it.
///
/// TOML errors surface as [`crate::errors::ServeError::Toml`], semantic
/// problems as [`crate::errors::ServeError::Validation`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = load_from_path(&path)?;
    let config = Config::try_from(raw_config)?;
    Ok(config)
}

/// `<source_root>/nodeserve.toml`, unless an explicit path was given.
///
/// Relative explicit paths are resolved against the source root.
pub fn resolve_config_path(source_root: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => source_root.join(path),
        None => source_root.join(DEFAULT_CONFIG_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServeError;

    #[test]
    fn defaults_fill_in_optional_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
            [workload]
            name = "mars"
            home = "/tmp/mars-home"

            [validator]
            name = "alice"

            [[accounts]]
            name = "alice"
            coins = ["100stake"]

            [init.app]
            minimum-gas-prices = "0stake"

            [[auxiliary]]
            name = "faucet"
            cmd = "marsd faucet"
            "#,
        )
        .unwrap();

        let cfg = load_and_validate(&path).unwrap();
        assert_eq!(cfg.watch.paths.len(), 5);
        assert_eq!(cfg.watch.ignored_extensions, vec!["pb.go", "pb.gw.go"]);
        assert_eq!(cfg.host.api, "0.0.0.0:1317");
        assert_eq!(cfg.workload.keyring_backend, "test");
        assert_eq!(cfg.home_dir(), PathBuf::from("/tmp/mars-home"));
        assert_eq!(cfg.binary_path(dir.path()), dir.path().join("build/marsd"));
        assert_eq!(cfg.auxiliary[0].name, "faucet");
        assert!(cfg.init.app.contains_key("minimum-gas-prices"));
    }

    #[test]
    fn malformed_toml_is_a_toml_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[workload\nname = ").unwrap();
        assert!(matches!(load_and_validate(&path), Err(ServeError::Toml(_))));
    }

    #[test]
    fn explicit_relative_path_is_under_source_root() {
        let root = Path::new("/src/mars");
        assert_eq!(
            resolve_config_path(root, Some(Path::new("conf/dev.toml"))),
            PathBuf::from("/src/mars/conf/dev.toml")
        );
        assert_eq!(
            resolve_config_path(root, None),
            PathBuf::from("/src/mars/nodeserve.toml")
        );
    }
}
