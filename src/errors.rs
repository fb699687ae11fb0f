// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::classify::ClassifiedError;
use crate::exec::ProcessFailure;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("config is not valid: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Process(#[from] ProcessFailure),

    #[error("multiple main packages found: {}", display_paths(.0))]
    AmbiguousEntryPoint(Vec<PathBuf>),

    #[error("no main package found under {0:?}")]
    NoEntryPoint(PathBuf),

    #[error("auxiliary service '{name}' failed: {source}")]
    Auxiliary {
        name: String,
        source: Box<ServeError>,
    },

    #[error("serve session cancelled")]
    Cancelled,

    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServeError {
    /// True for the cooperative-cancellation outcome of a session or unit.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServeError::Cancelled)
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ServeError>;
