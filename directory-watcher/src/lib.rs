//! # Directory Watcher
//!
//! This crate provides the file system side of logbridge: it keeps the set
//! of watched paths in line with configuration and turns change
//! notifications into candidate files for ingestion.
//!
//! ## Features
//!
//! - **Real-time Watching**: Monitor log directories and the config file
//! - **Watch Reconciliation**: Diff desired against watched paths, best effort
//! - **Candidate Scans**: Recursive startup walk filtered by file suffix
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  desired set ──► reconcile ──► WatchSource ──► FileEvent        │
//! │                                     │              │            │
//! │                                     ▼              ▼            │
//! │                              watcher errors   scan_candidates   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod event;
pub mod scan;
pub mod watch_set;
pub mod watcher;

pub use error::{Result, WatcherError};
pub use event::{FileEvent, FileEventKind};
pub use scan::{matches_suffix, scan_candidates};
pub use watch_set::{ReconcileReport, WatchSource, reconcile};
pub use watcher::{DirectoryWatcher, WatchStreams};
