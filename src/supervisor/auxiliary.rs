// src/supervisor/auxiliary.rs

//! Services supervised alongside the workload process.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::config::AuxiliaryConfig;
use crate::errors::Result;
use crate::exec::{spawn_process, CommandSpec};

/// A long-running helper with a `serve until cancelled` lifecycle.
///
/// Returning `Err(ServeError::Cancelled)` after the token fires is a clean
/// stop; any other error brings the whole session down.
pub trait AuxiliaryService: Send + Sync {
    fn name(&self) -> &str;

    fn serve(&self, cancel: CancellationToken) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Auxiliary service backed by a shell command.
#[derive(Debug, Clone)]
pub struct CommandService {
    name: String,
    spec: CommandSpec,
    echo: bool,
}

impl CommandService {
    pub fn new(name: impl Into<String>, spec: CommandSpec, echo: bool) -> Self {
        Self {
            name: name.into(),
            spec,
            echo,
        }
    }

    pub fn from_config(cfg: &AuxiliaryConfig, echo: bool) -> Self {
        Self::new(cfg.name.clone(), CommandSpec::shell(&cfg.cmd), echo)
    }
}

impl AuxiliaryService for CommandService {
    fn name(&self) -> &str {
        &self.name
    }

    fn serve(&self, cancel: CancellationToken) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let process = spawn_process(&self.name, &self.spec, self.echo)?;
            process.supervise(cancel).await
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::errors::ServeError;
    use crate::supervisor::ProcessSupervisor;
    use std::sync::Arc;

    #[tokio::test]
    async fn failing_auxiliary_is_wrapped_and_fatal() {
        let parent = CancellationToken::new();
        let mut sup = ProcessSupervisor::new(&parent);
        sup.spawn_auxiliary(Arc::new(CommandService::new(
            "faucet",
            CommandSpec::shell("echo 'no funds' >&2; exit 2"),
            false,
        )));
        sup.spawn_auxiliary(Arc::new(CommandService::new(
            "sleeper",
            CommandSpec::shell("sleep 30"),
            false,
        )));

        match sup.wait().await {
            Err(ServeError::Auxiliary { name, source }) => {
                assert_eq!(name, "faucet");
                assert!(matches!(*source, ServeError::Process(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
