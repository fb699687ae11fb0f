// src/engine/refresh.rs

//! Single-slot refresh signalling between the watcher and the controller.
//!
//! A refresh cancels the running session first and then leaves one pending
//! signal in a channel of capacity 1. Signals arriving while one is already
//! pending coalesce into it.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cloneable handle used to request a refresh.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    session: Arc<Mutex<Option<CancellationToken>>>,
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Cancel the current session (if any) and queue a refresh.
    pub fn refresh(&self) {
        let session = lock(&self.session);
        if let Some(token) = session.as_ref() {
            token.cancel();
        }
        match self.tx.try_send(()) {
            Ok(()) => debug!("refresh queued"),
            Err(TrySendError::Full(())) => debug!("refresh already pending; coalesced"),
            Err(TrySendError::Closed(())) => debug!("refresh receiver gone"),
        }
    }
}

/// Receiving side, owned by the controller.
#[derive(Debug)]
pub struct RefreshChannel {
    handle: RefreshHandle,
    rx: mpsc::Receiver<()>,
}

impl Default for RefreshChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            handle: RefreshHandle {
                session: Arc::new(Mutex::new(None)),
                tx,
            },
            rx,
        }
    }

    pub fn handle(&self) -> RefreshHandle {
        self.handle.clone()
    }

    /// Wait for the next refresh. Returns `false` once `shutdown` fires.
    pub async fn recv(&mut self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            msg = self.rx.recv() => msg.is_some(),
        }
    }

    /// Create the token for a new session and make it the one refreshes cancel.
    ///
    /// A refresh that slipped in after [`Self::recv`] returned is still
    /// pending in the channel; the new session is then cancelled right away
    /// so the pending signal is served next.
    pub fn begin_session(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        let mut session = lock(&self.handle.session);
        if !self.rx.is_empty() {
            token.cancel();
        }
        *session = Some(token.clone());
        token
    }
}

fn lock(slot: &Mutex<Option<CancellationToken>>) -> MutexGuard<'_, Option<CancellationToken>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
