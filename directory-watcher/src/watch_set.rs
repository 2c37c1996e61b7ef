//! Watch-set reconciliation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::Result;

/// Something that can subscribe to change notifications for paths.
pub trait WatchSource {
    /// Start watching `path`.
    fn watch(&mut self, path: &Path) -> Result<()>;

    /// Stop watching `path`.
    fn unwatch(&mut self, path: &Path) -> Result<()>;

    /// Paths currently watched.
    fn watched(&self) -> Vec<PathBuf>;
}

/// What a call to [`reconcile`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Paths that are now watched.
    pub added: Vec<PathBuf>,

    /// Paths that are no longer watched.
    pub removed: Vec<PathBuf>,

    /// Paths whose watch or unwatch failed, with the error message.
    pub failed: Vec<(PathBuf, String)>,
}

impl ReconcileReport {
    /// Check if reconciliation touched nothing.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Bring `source` in line with `desired`.
///
/// Every watched path missing from `desired` is unwatched, then every
/// desired path not yet watched is watched. Failures are logged and
/// collected; the remaining paths are still processed.
pub fn reconcile<S>(source: &mut S, desired: &BTreeSet<PathBuf>) -> ReconcileReport
where
    S: WatchSource + ?Sized,
{
    let mut report = ReconcileReport::default();
    let current: BTreeSet<PathBuf> = source.watched().into_iter().collect();

    for path in current.difference(desired) {
        match source.unwatch(path) {
            Ok(()) => {
                info!("Stopped watching: {}", path.display());
                report.removed.push(path.clone());
            }
            Err(e) => {
                error!("Failed to remove watch {}: {e}", path.display());
                report.failed.push((path.clone(), e.to_string()));
            }
        }
    }

    for path in desired.difference(&current) {
        match source.watch(path) {
            Ok(()) => {
                info!("Watching path: {}", path.display());
                report.added.push(path.clone());
            }
            Err(e) => {
                error!("Failed to add path to watcher {}: {e}", path.display());
                report.failed.push((path.clone(), e.to_string()));
            }
        }
    }

    report
}
