//! Candidate discovery by directory scanning.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Result, WatcherError};

/// Check if the file name of `path` ends with `suffix` (case-sensitive).
pub fn matches_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(suffix))
}

/// Walk `root` recursively and collect files whose name ends with `suffix`.
///
/// Unreadable entries are logged and skipped. Results are in walk order.
pub fn scan_candidates(root: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let start = std::time::Instant::now();

    if !root.is_dir() {
        return Err(WatcherError::DirectoryNotFound(root.display().to_string()));
    }

    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };

        if entry.file_type().is_file() && matches_suffix(entry.path(), suffix) {
            candidates.push(entry.into_path());
        }
    }

    info!(
        "Scanned {} in {:?} ({} candidates)",
        root.display(),
        start.elapsed(),
        candidates.len()
    );
    Ok(candidates)
}
