// tests/config_validation.rs

use std::error::Error;

use nodeserve::classify::{classify, ClassifiedError, InitFailureKind, Phase};
use nodeserve::config::{load_and_validate, DEFAULT_CONFIG_FILE};
use nodeserve::errors::ServeError;
use nodeserve_test_utils::builders::ConfigBuilder;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn builder_defaults_are_valid() {
    let cfg = ConfigBuilder::new("mars").build();
    assert_eq!(cfg.identity(), "mars");
    assert_eq!(cfg.binary_name(), "marsd");
    assert_eq!(cfg.validator.name, "alice");
    assert_eq!(cfg.accounts.len(), 1);
}

#[test]
fn missing_pieces_fail_validation() {
    for builder in [
        ConfigBuilder::empty(),
        ConfigBuilder::new("mars").without_accounts(),
        ConfigBuilder::new("mars").validator(""),
        ConfigBuilder::new("mars").account("alice", &["1stake"]),
        ConfigBuilder::new("mars").auxiliary("faucet", " "),
    ] {
        let err = builder.try_build().unwrap_err();
        assert!(matches!(err, ServeError::Validation(_)), "{err:?}");
    }
}

#[test]
fn validation_errors_classify_as_init_validation_in_every_phase() {
    for phase in [Phase::Build, Phase::Init, Phase::Start] {
        let err = ConfigBuilder::new("mars")
            .without_accounts()
            .try_build()
            .unwrap_err();
        match classify(phase, "marsd", err) {
            ServeError::Classified(ClassifiedError::Init { kind, message }) => {
                assert_eq!(kind, InitFailureKind::Validation);
                assert!(message.contains("[[accounts]]"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn rendered_toml_loads_back() -> TestResult {
    let dir = tempfile::tempdir()?;
    let builder = ConfigBuilder::new("mars")
        .id("mars-1")
        .account("bob", &["1token", "2stake"])
        .watch_paths(&["x", "app"])
        .auxiliary("faucet", "faucet --port 4500");
    let path = dir.path().join(DEFAULT_CONFIG_FILE);
    std::fs::write(&path, builder.to_toml())?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.identity(), "mars-1");
    assert_eq!(cfg.accounts[1].coins, vec!["1token", "2stake"]);
    assert_eq!(cfg.watch.paths.len(), 2);
    assert_eq!(cfg.auxiliary[0].cmd, "faucet --port 4500");
    // Untouched sections keep their defaults.
    assert_eq!(cfg.watch.ignored_extensions, vec!["pb.go", "pb.gw.go"]);
    assert_eq!(cfg.workload.toolchain, "go");
    Ok(())
}
