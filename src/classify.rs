// src/classify.rs

//! Failure classification for the build / init / start phases.
//!
//! Subprocess failures are opaque: all we get is an exit status and the tail
//! of stderr. This module turns them into a closed set of kinds so the
//! controller can pick a recovery policy without looking at free text.
//!
//! Everything here is pure. [`classify`] labels, it never retries.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::errors::ServeError;

/// Signature of a listener that could not bind its port.
const ADDRESS_IN_USE_SIGNATURE: &str = "bind: address already in use";

/// Signature of a bootstrap state that replays into an empty validator set.
pub const VALIDATOR_SET_EMPTY_SIGNATURE: &str =
    "validator set is nil in genesis and still empty after InitChain";

const VALIDATOR_SET_EMPTY_MESSAGE: &str = "error during handshake: error on replay: \
     validator set is nil in genesis and still empty after InitChain";

static ADDRESS_IN_USE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"listen .* bind: address already in use")
        .expect("address-in-use pattern is a valid regex")
});

/// Phase of a serve cycle a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Init,
    Start,
}

/// Where a classified failure is being judged.
///
/// The dry-run verification start tolerates failures that a long-lived serve
/// session must not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitFailureKind {
    /// The bootstrap state or the configuration behind it is malformed.
    Validation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailureKind {
    AddressInUse,
    ValidatorSetEmpty,
    Unrecognized,
}

impl StartFailureKind {
    /// Whether this start failure still counts as a successful start in `mode`.
    ///
    /// A network with no registered validators legitimately replays into an
    /// empty set, so verification accepts it. Serving never does.
    pub fn is_acceptable_in(self, mode: RunMode) -> bool {
        matches!(
            (self, mode),
            (StartFailureKind::ValidatorSetEmpty, RunMode::Verify)
        )
    }
}

/// A failure labelled with its phase and kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifiedError {
    #[error("cannot build workload:\n\n\t{message}")]
    Build {
        message: String,
        hint: Option<String>,
    },

    #[error("cannot initialize workload:\n\n\t{message}")]
    Init {
        kind: InitFailureKind,
        message: String,
    },

    #[error("{}", start_summary(.kind, .app, .detail))]
    Start {
        kind: StartFailureKind,
        app: String,
        detail: String,
    },
}

impl ClassifiedError {
    /// Build and init failures almost always need an edit to fix, so the
    /// controller waits for the next refresh instead of exiting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClassifiedError::Build { .. } | ClassifiedError::Init { .. }
        )
    }

    pub fn start_kind(&self) -> Option<StartFailureKind> {
        match self {
            ClassifiedError::Start { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Operator-facing instruction to go with the failure, if there is one.
    pub fn remediation(&self) -> Option<String> {
        match self {
            ClassifiedError::Build { hint, .. } => hint.clone(),
            ClassifiedError::Init {
                kind: InitFailureKind::Validation,
                ..
            } => Some(
                "check the [validator] and [[accounts]] sections of the nodeserve config"
                    .to_string(),
            ),
            ClassifiedError::Init { .. } => None,
            ClassifiedError::Start { kind, .. } => Some(match kind {
                StartFailureKind::AddressInUse => {
                    "another process holds one of the workload ports; change the addresses under [host] in the config"
                        .to_string()
                }
                StartFailureKind::ValidatorSetEmpty => {
                    "the bootstrap state has no validators; reinitialize it with `nodeserve serve --reset-once`"
                        .to_string()
                }
                StartFailureKind::Unrecognized => {
                    "the workload could not start. If the new code is no longer compatible with the saved state, reset it with `nodeserve serve --reset-once`"
                        .to_string()
                }
            }),
        }
    }
}

fn start_summary(kind: &StartFailureKind, app: &str, detail: &str) -> String {
    match kind {
        StartFailureKind::AddressInUse | StartFailureKind::ValidatorSetEmpty => detail.to_string(),
        StartFailureKind::Unrecognized => format!("cannot start {app}:\n{detail}"),
    }
}

/// Match captured stderr against the known start-failure signatures.
pub fn start_failure_kind(stderr: &str) -> StartFailureKind {
    if stderr.contains(ADDRESS_IN_USE_SIGNATURE) {
        StartFailureKind::AddressInUse
    } else if stderr.contains(VALIDATOR_SET_EMPTY_SIGNATURE) {
        StartFailureKind::ValidatorSetEmpty
    } else {
        StartFailureKind::Unrecognized
    }
}

/// The human-readable cause for a start failure of `kind`.
///
/// Workload logs are far too long to show verbatim, so recognised failures
/// are reduced to the one line that matters.
fn start_detail(kind: StartFailureKind, stderr: &str) -> String {
    match kind {
        StartFailureKind::AddressInUse => ADDRESS_IN_USE_LINE
            .find(stderr)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| ADDRESS_IN_USE_SIGNATURE.to_string()),
        StartFailureKind::ValidatorSetEmpty => VALIDATOR_SET_EMPTY_MESSAGE.to_string(),
        StartFailureKind::Unrecognized => stderr.trim().to_string(),
    }
}

/// Label a start failure from its stderr tail.
pub fn classify_start_output(app: &str, stderr: &str) -> ClassifiedError {
    let kind = start_failure_kind(stderr);
    ClassifiedError::Start {
        kind,
        app: app.to_string(),
        detail: start_detail(kind, stderr),
    }
}

/// Label `err` raised during `phase`.
///
/// Errors that do not belong to the build/init/start taxonomy (cache I/O,
/// watcher, auxiliary services, cancellation) come back unchanged.
pub fn classify(phase: Phase, app: &str, err: ServeError) -> ServeError {
    let classified = match (phase, err) {
        (_, ServeError::Validation(message)) => ClassifiedError::Init {
            kind: InitFailureKind::Validation,
            message: format!("config is not valid: {message}"),
        },
        (Phase::Build, ServeError::Process(failure)) => ClassifiedError::Build {
            message: failure.to_string(),
            hint: None,
        },
        (Phase::Build, err @ ServeError::AmbiguousEntryPoint(_)) => ClassifiedError::Build {
            message: err.to_string(),
            hint: Some(
                "set `workload.main` in the config to the path of the workload's main package"
                    .to_string(),
            ),
        },
        (
            Phase::Build,
            err @ (ServeError::NoEntryPoint(_) | ServeError::Config(_) | ServeError::Toml(_)),
        ) => ClassifiedError::Build {
            message: err.to_string(),
            hint: None,
        },
        (Phase::Init, ServeError::Process(failure)) => ClassifiedError::Init {
            kind: InitFailureKind::Other,
            message: failure.to_string(),
        },
        (Phase::Start, ServeError::Process(failure)) => {
            classify_start_output(app, &failure.stderr_tail)
        }
        (_, other) => return other,
    };

    ServeError::Classified(classified)
}
