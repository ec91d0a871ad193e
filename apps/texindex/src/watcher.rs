//! # File Watching
//!
//! `NotifyWatcher` implements the index's `FileWatcher` seam on top of
//! `notify`. Raw notifications arrive on notify's own thread and are
//! forwarded as `WatchEvent`s over an unbounded tokio channel; the index
//! consumes them on the main task through `ingest_watch`.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use texindex_core::{FileWatcher, PathResolver, TexIndexError, WatchEvent};
use tokio::sync::mpsc;

/// `FileWatcher` backed by the platform watcher.
pub struct NotifyWatcher {
    inner: RecommendedWatcher,
}

impl NotifyWatcher {
    /// Create a watcher forwarding events to `events`.
    pub fn new(events: mpsc::UnboundedSender<WatchEvent>) -> Result<Self, TexIndexError> {
        let inner = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for change in watch_events(&event) {
                        if events.send(change).is_err() {
                            tracing::debug!("watch channel closed, event dropped");
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "file watch error"),
            },
            Config::default(),
        )
        .map_err(|e| TexIndexError::IoError(format!("cannot start file watcher: {e}")))?;
        Ok(Self { inner })
    }
}

impl FileWatcher for NotifyWatcher {
    fn watch(&mut self, path: &str) -> Result<(), TexIndexError> {
        self.inner
            .watch(Path::new(path), RecursiveMode::NonRecursive)
            .map_err(|e| TexIndexError::IoError(e.to_string()))?;
        tracing::trace!(path, "watching");
        Ok(())
    }

    fn unwatch(&mut self, path: &str) {
        if let Err(e) = self.inner.unwatch(Path::new(path)) {
            tracing::debug!(path, error = %e, "unwatch failed");
        }
    }
}

/// Index events for one notification.
///
/// Every touched path yields a `FileChanged` for itself and a
/// `DirectoryChanged` for its parent; the index ignores paths it does not
/// track. Access notifications carry no change and yield nothing.
pub fn watch_events(event: &Event) -> Vec<WatchEvent> {
    if !matches!(
        event.kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    let mut out = Vec::new();
    for path in &event.paths {
        let path = PathResolver::normalize(&path.to_string_lossy());
        if let Some(dir) = PathResolver::parent(&path) {
            out.push(WatchEvent::DirectoryChanged(dir));
        }
        out.push(WatchEvent::FileChanged(path));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, ModifyKind};
    use std::path::PathBuf;

    #[test]
    fn modifications_map_to_file_and_directory() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/proj/sourceimages/wood.png"));
        assert_eq!(
            watch_events(&event),
            vec![
                WatchEvent::DirectoryChanged("/proj/sourceimages".into()),
                WatchEvent::FileChanged("/proj/sourceimages/wood.png".into()),
            ]
        );
    }

    #[test]
    fn access_is_ignored() {
        let event = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/proj/sourceimages/wood.png"));
        assert!(watch_events(&event).is_empty());
    }

    #[tokio::test]
    async fn real_directory_reports_creation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = PathResolver::normalize(&dir.path().to_string_lossy());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = NotifyWatcher::new(tx).expect("watcher");
        watcher.watch(&root).expect("watch");

        std::fs::write(dir.path().join("new.png"), b"png").expect("write");

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time");
        assert!(received.is_some());
    }
}
