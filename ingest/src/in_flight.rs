//! Tracking of files currently owned by a worker.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Set of paths that a worker is processing right now.
///
/// A path is in the set exactly while an [`InFlightGuard`] for it exists.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlightSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `path`.
    ///
    /// Returns `None` if another worker already owns it. The entry is
    /// released when the returned guard is dropped.
    pub fn try_claim(&self, path: &Path) -> Option<InFlightGuard> {
        if !self.lock().insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            path: path.to_path_buf(),
        })
    }

    /// Check if `path` is owned by a worker.
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    /// Number of paths in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no path is in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ownership of one in-flight path.
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    path: PathBuf,
}

impl InFlightGuard {
    /// The claimed path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}
