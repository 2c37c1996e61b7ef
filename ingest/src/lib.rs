//! # Ingest
//!
//! This crate ties the event-log parser and the directory watcher into the
//! logbridge pipeline: discover export files, parse them, append their
//! records to a per-project JSON-lines stream, then archive or delete them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        IngestService                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ConfigStore ──► reconcile ──► DirectoryWatcher                 │
//! │                                      │                          │
//! │  initial scan ─────────┬─────── FileEvent                       │
//! │                        ▼                                        │
//! │                 IngestCoordinator ── InFlightSet                │
//! │                        │                                        │
//! │     RecordSource ──► retry ──► Sink ──► rename / delete         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use logbridge_ingest::{ConfigStore, IngestCoordinator, IngestService, JsonLinesSink, XmlRecordSource};
//! use logbridge_directory_watcher::DirectoryWatcher;
//!
//! let store = ConfigStore::load("/etc/logbridge/config.json")?;
//! let (watcher, streams) = DirectoryWatcher::new()?;
//! let coordinator = IngestCoordinator::new(Arc::new(XmlRecordSource), Arc::new(JsonLinesSink::new()));
//! IngestService::new(store, coordinator, watcher, streams).run().await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod in_flight;
pub mod lifecycle;
pub mod logging;
pub mod retry;
pub mod service;
pub mod sink;
pub mod source;

pub use config::{Config, ConfigStore, LogDir, Project, ProjectContext};
pub use coordinator::IngestCoordinator;
pub use error::{ConfigError, IngestError, Result, SinkError};
pub use in_flight::{InFlightGuard, InFlightSet};
pub use lifecycle::{ARCHIVE_SUFFIX, FileOutcome, archive_path};
pub use logging::{LoggingHandle, init_logging, parse_level};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use service::{CANDIDATE_SUFFIX, EventOutcome, IngestService, scan_and_dispatch};
pub use sink::{JsonLinesSink, Sink};
pub use source::{RecordSource, XmlRecordSource};
