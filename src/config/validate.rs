// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::model::{Config, RawConfig};
use crate::errors::{Result, ServeError};

impl TryFrom<RawConfig> for Config {
    type Error = ServeError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(Config::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfig) -> Result<()> {
    validate_workload(cfg)?;
    validate_accounts(cfg)?;
    validate_validator(cfg)?;
    validate_auxiliary(cfg)?;
    Ok(())
}

fn validate_workload(cfg: &RawConfig) -> Result<()> {
    if cfg.workload.name.trim().is_empty() {
        return Err(ServeError::Validation(
            "[workload].name is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_accounts(cfg: &RawConfig) -> Result<()> {
    if cfg.accounts.is_empty() {
        return Err(ServeError::Validation(
            "at least one [[accounts]] entry is required".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for account in &cfg.accounts {
        if account.name.trim().is_empty() {
            return Err(ServeError::Validation(
                "every [[accounts]] entry needs a name".to_string(),
            ));
        }
        if !seen.insert(account.name.as_str()) {
            return Err(ServeError::Validation(format!(
                "account '{}' is defined more than once",
                account.name
            )));
        }
        if account.address.is_some() && account.mnemonic.is_some() {
            return Err(ServeError::Validation(format!(
                "account '{}' sets both `address` and `mnemonic`",
                account.name
            )));
        }
    }
    Ok(())
}

fn validate_validator(cfg: &RawConfig) -> Result<()> {
    if cfg.validator.name.trim().is_empty() {
        return Err(ServeError::Validation(
            "[validator].name is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_auxiliary(cfg: &RawConfig) -> Result<()> {
    for aux in &cfg.auxiliary {
        if aux.name.trim().is_empty() || aux.cmd.trim().is_empty() {
            return Err(ServeError::Validation(
                "every [[auxiliary]] entry needs a name and a cmd".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> RawConfig {
        toml::from_str(src).expect("valid toml")
    }

    const VALID: &str = r#"
        [workload]
        name = "mars"

        [validator]
        name = "alice"

        [[accounts]]
        name = "alice"
        coins = ["100stake"]
    "#;

    #[test]
    fn accepts_minimal_config() {
        let cfg = Config::try_from(parse(VALID)).unwrap();
        assert_eq!(cfg.identity(), "mars");
        assert_eq!(cfg.binary_name(), "marsd");
    }

    #[test]
    fn requires_an_account() {
        let err = Config::try_from(parse(
            r#"
            [workload]
            name = "mars"
            [validator]
            name = "alice"
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, ServeError::Validation(msg) if msg.contains("accounts")));
    }

    #[test]
    fn requires_a_validator_name() {
        let err = Config::try_from(parse(
            r#"
            [workload]
            name = "mars"
            [[accounts]]
            name = "alice"
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, ServeError::Validation(msg) if msg.contains("validator")));
    }

    #[test]
    fn rejects_duplicate_accounts() {
        let err = Config::try_from(parse(
            r#"
            [workload]
            name = "mars"
            [validator]
            name = "alice"
            [[accounts]]
            name = "alice"
            [[accounts]]
            name = "alice"
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, ServeError::Validation(_)));
    }
}
