//! Terminal states of a processed file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Suffix appended to a file once its records were shipped.
pub const ARCHIVE_SUFFIX: &str = ".bak";

/// Where a file ended up after a worker finished with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Every parse attempt failed. The file is untouched.
    ParseFailed,

    /// Records could not be written. The file is untouched and will be
    /// picked up again by the next event or scan.
    SinkFailed,

    /// Records were shipped but the file could not be renamed.
    RenameFailed,

    /// Records were shipped and the file carries the archive suffix.
    Archived,

    /// Records were shipped and the archived file was removed.
    Deleted,

    /// Records were shipped and the file archived, but removing it failed.
    DeleteFailed,
}

/// `path` with [`ARCHIVE_SUFFIX`] appended to the full file name.
pub fn archive_path(path: &Path) -> PathBuf {
    let mut archived = OsString::from(path.as_os_str());
    archived.push(ARCHIVE_SUFFIX);
    PathBuf::from(archived)
}
