// src/supervisor/mod.rs

//! Fan-out / fan-in supervision of the workload and its auxiliary services.
//!
//! Every unit gets a child of one cancellation token. The first unit to fail
//! with anything other than cancellation wins: its error is kept, the
//! siblings are cancelled, and [`ProcessSupervisor::wait`] returns only after
//! every unit has finished.

pub mod auxiliary;

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::{Result, ServeError};

pub use auxiliary::{AuxiliaryService, CommandService};

pub struct ProcessSupervisor {
    parent: CancellationToken,
    cancel: CancellationToken,
    units: JoinSet<(String, Result<()>)>,
}

impl ProcessSupervisor {
    /// Supervise units in a cancellation domain derived from `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            parent: parent.clone(),
            cancel: parent.child_token(),
            units: JoinSet::new(),
        }
    }

    /// Token shared by all units; cancelled on the first failure.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Run `unit` under this supervisor.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, unit: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let fut = unit(self.cancel.child_token());
        debug!(unit = %name, "spawning supervised unit");
        self.units.spawn(async move { (name, fut.await) });
    }

    /// Run an auxiliary service; its failures are tagged with its name.
    pub fn spawn_auxiliary(&mut self, service: Arc<dyn AuxiliaryService>) {
        let name = service.name().to_string();
        self.spawn(name.clone(), move |cancel| async move {
            match service.serve(cancel).await {
                Ok(()) => Ok(()),
                Err(ServeError::Cancelled) => Err(ServeError::Cancelled),
                Err(err) => Err(ServeError::Auxiliary {
                    name,
                    source: Box::new(err),
                }),
            }
        });
    }

    /// Block until every unit has finished.
    ///
    /// - first non-cancellation error: returned after the siblings stop
    /// - parent cancelled: [`ServeError::Cancelled`]
    /// - otherwise: `Ok(())`
    pub async fn wait(mut self) -> Result<()> {
        let mut first_error: Option<ServeError> = None;

        while let Some(joined) = self.units.join_next().await {
            let (name, result) = match joined {
                Ok(pair) => pair,
                Err(join_err) => (
                    "<panicked unit>".to_string(),
                    Err(ServeError::Other(anyhow::anyhow!(
                        "supervised unit panicked: {join_err}"
                    ))),
                ),
            };

            match result {
                Ok(()) => debug!(unit = %name, "unit finished"),
                Err(ServeError::Cancelled) => debug!(unit = %name, "unit cancelled"),
                Err(err) => {
                    if first_error.is_none() {
                        error!(unit = %name, error = %err, "unit failed; stopping siblings");
                        self.cancel.cancel();
                        first_error = Some(err);
                    } else {
                        debug!(unit = %name, error = %err, "further unit failure ignored");
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if self.parent.is_cancelled() {
            info!("supervised units stopped after cancellation");
            return Err(ServeError::Cancelled);
        }
        Ok(())
    }
}
