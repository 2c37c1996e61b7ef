//! Change notifications, one per affected path.

use std::path::PathBuf;

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

/// A change reported for a single path.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Split a notify event into one file event per path.
    ///
    /// A rename reported with both ends in one event yields a `RenamedFrom`
    /// for the old path and a `RenamedTo` for the new one.
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
            let mut paths = event.paths.into_iter();
            return paths
                .next()
                .map(|from| Self::new(FileEventKind::RenamedFrom, from))
                .into_iter()
                .chain(paths.map(|to| Self::new(FileEventKind::RenamedTo, to)))
                .collect();
        }

        let kind = FileEventKind::from(event.kind);
        event
            .paths
            .into_iter()
            .map(|path| Self::new(kind, path))
            .collect()
    }

    /// Check if the event means new content may be at `path`.
    pub fn is_write_or_create(&self) -> bool {
        self.kind.is_write_or_create()
    }
}

/// What happened to a path, reduced to what ingestion cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    /// Content written. Metadata-only changes are `Other`.
    Modified,
    /// Old side of a rename.
    RenamedFrom,
    /// New side of a rename.
    RenamedTo,
    Removed,
    Other,
}

impl FileEventKind {
    /// Writes and creations are handled the same way. A file renamed into a
    /// watched directory counts as created.
    pub fn is_write_or_create(self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::RenamedTo)
    }
}

impl From<EventKind> for FileEventKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Created,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Self::RenamedFrom,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Self::RenamedTo,
            EventKind::Modify(ModifyKind::Metadata(_)) => Self::Other,
            EventKind::Modify(_) => Self::Modified,
            EventKind::Remove(_) => Self::Removed,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Self::Other,
        }
    }
}
