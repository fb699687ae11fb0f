// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::RefreshHandle;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::WatchScope;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping the handle
/// stops watching.
pub struct WatcherHandle {
    _inner: Option<RecommendedWatcher>,
    task: JoinHandle<Result<()>>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl WatcherHandle {
    /// Stop forwarding events and report whether watching failed.
    pub async fn stop(self) -> Result<()> {
        self.task.abort();
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Whether an event can change file content.
fn is_content_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// First in-scope path of `event`, relative to `root`.
pub fn relevant_path(root: &std::path::Path, scope: &WatchScope, event: &Event) -> Option<String> {
    if !is_content_event(&event.kind) {
        return None;
    }
    event
        .paths
        .iter()
        .filter_map(|path| relative_str(root, path))
        .find(|rel| scope.matches(rel))
}

/// Turn raw watcher results into refresh requests on a background task.
///
/// A watcher error cancels `shutdown` and ends the task with that error;
/// [`WatcherHandle::stop`] hands it back once the controller has unwound.
pub fn forward_events(
    root: PathBuf,
    scope: WatchScope,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    refresh: RefreshHandle,
    shutdown: CancellationToken,
) -> WatcherHandle {
    let task = tokio::spawn(async move {
        while let Some(res) = events.recv().await {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    error!(error = %err, "file watch failed");
                    shutdown.cancel();
                    return Err(anyhow!(err).context("file watcher failed"));
                }
            };
            match relevant_path(&root, &scope, &event) {
                Some(rel) => {
                    println!("[nodeserve] {rel} changed");
                    refresh.refresh();
                }
                None => debug!(?event, "ignoring file event"),
            }
        }
        warn!("file watcher event loop finished");
        Ok(())
    });

    WatcherHandle { _inner: None, task }
}

/// Watch `root` recursively and request a refresh whenever an in-scope path
/// changes.
///
/// Refresh requests coalesce in the controller's single-slot channel, so a
/// burst of saves produces at most one pending rebuild.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    scope: WatchScope,
    refresh: RefreshHandle,
    shutdown: CancellationToken,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            // Receiver is gone once the runtime shuts down.
            let _ = event_tx.send(res);
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = ?root, ?scope, "file watcher started");

    let mut handle = forward_events(root, scope, event_rx, refresh, shutdown);
    handle._inner = Some(watcher);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use notify::event::{AccessKind, CreateKind, ModifyKind};

    use super::*;

    fn scope() -> WatchScope {
        WatchScope::new(&[PathBuf::from("x")], &[], &[], Vec::new()).unwrap()
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn content_events_in_scope_are_relevant() {
        let root = Path::new("/src/mars");
        let ev = event(EventKind::Create(CreateKind::File), "/src/mars/x/keeper.go");
        assert_eq!(relevant_path(root, &scope(), &ev).as_deref(), Some("x/keeper.go"));

        let ev = event(EventKind::Modify(ModifyKind::Any), "/src/mars/x/keeper.go");
        assert!(relevant_path(root, &scope(), &ev).is_some());
    }

    #[test]
    fn access_and_out_of_scope_events_are_ignored() {
        let root = Path::new("/src/mars");
        let ev = event(EventKind::Access(AccessKind::Any), "/src/mars/x/keeper.go");
        assert_eq!(relevant_path(root, &scope(), &ev), None);

        let ev = event(EventKind::Modify(ModifyKind::Any), "/src/mars/docs/README.md");
        assert_eq!(relevant_path(root, &scope(), &ev), None);
    }

    #[tokio::test]
    async fn in_scope_event_requests_refresh() {
        let channel = crate::engine::RefreshChannel::new();
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = forward_events(
            PathBuf::from("/src/mars"),
            scope(),
            rx,
            channel.handle(),
            shutdown.clone(),
        );

        let session = channel.begin_session(&shutdown);
        tx.send(Ok(event(EventKind::Create(CreateKind::File), "/src/mars/x/keeper.go")))
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), session.cancelled())
            .await
            .unwrap();

        assert!(!shutdown.is_cancelled());
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn watch_error_cancels_shutdown_and_is_reported() {
        let channel = crate::engine::RefreshChannel::new();
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = forward_events(
            PathBuf::from("/src/mars"),
            scope(),
            rx,
            channel.handle(),
            shutdown.clone(),
        );

        tx.send(Err(notify::Error::generic("inotify queue overflow")))
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), shutdown.cancelled())
            .await
            .unwrap();

        let err = handle.stop().await.unwrap_err();
        assert!(format!("{err:#}").contains("inotify queue overflow"), "{err:#}");
    }
}
