//! Directory watcher implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{Result, WatcherError};
use crate::event::FileEvent;
use crate::watch_set::WatchSource;

/// Capacity of the channels bridging notify callbacks to async consumers.
const CHANNEL_CAPACITY: usize = 1000;

/// Receiving ends of a [`DirectoryWatcher`].
#[derive(Debug)]
pub struct WatchStreams {
    /// File events, one per affected path.
    pub events: mpsc::Receiver<FileEvent>,

    /// Errors reported asynchronously by the notification backend.
    pub errors: mpsc::Receiver<WatcherError>,
}

/// Paths the backend currently holds a watch for.
///
/// Shared with the notify callback, which drops a path once the backend
/// reports it gone.
#[derive(Debug, Clone, Default)]
struct LiveWatches(Arc<Mutex<BTreeSet<PathBuf>>>);

impl LiveWatches {
    fn lock(&self) -> MutexGuard<'_, BTreeSet<PathBuf>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget_all<'a>(&self, paths: impl IntoIterator<Item = &'a PathBuf>) {
        let mut watched = self.lock();
        for path in paths {
            if watched.remove(path) {
                debug!("Watch dropped by the backend: {}", path.display());
            }
        }
    }
}

/// Watches paths with the platform's recommended notify backend.
///
/// Directories are watched recursively, single files (such as the
/// configuration file) non-recursively. A watched path that is removed is
/// no longer reported by [`WatchSource::watched`], so the next
/// reconciliation subscribes it again once it exists.
pub struct DirectoryWatcher {
    /// Internal notify watcher.
    watcher: RecommendedWatcher,

    watched: LiveWatches,
}

impl DirectoryWatcher {
    /// Create a new directory watcher with nothing watched yet.
    pub fn new() -> Result<(Self, WatchStreams)> {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let watched = LiveWatches::default();
        let live = watched.clone();

        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let EventKind::Remove(_) = event.kind {
                        live.forget_all(&event.paths);
                    }
                    for file_event in FileEvent::from_notify(event) {
                        if let Err(e) = event_tx.blocking_send(file_event) {
                            error!("Failed to send file event: {e}");
                        }
                    }
                }
                Err(e) => {
                    if let notify::ErrorKind::WatchNotFound = e.kind {
                        live.forget_all(&e.paths);
                    }
                    if let Err(e) = error_tx.blocking_send(WatcherError::Notify(e)) {
                        error!("Failed to send watch error: {e}");
                    }
                }
            },
        )?;

        let streams = WatchStreams {
            events: event_rx,
            errors: error_rx,
        };

        Ok((Self { watcher, watched }, streams))
    }

    /// Check if `path` is currently watched.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.lock().contains(path)
    }
}

impl WatchSource for DirectoryWatcher {
    fn watch(&mut self, path: &Path) -> Result<()> {
        let mode = if path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        self.watcher.watch(path, mode)?;
        self.watched.lock().insert(path.to_path_buf());
        debug!("Started watching: {}", path.display());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        if !self.watched.lock().remove(path) {
            return Err(WatcherError::NotWatching(path.display().to_string()));
        }
        // Forgotten even when the backend already dropped the watch.
        self.watcher.unwatch(path)?;
        debug!("Stopped watching: {}", path.display());
        Ok(())
    }

    fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }
}
