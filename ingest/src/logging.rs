//! Process logging.
//!
//! JSON lines go to a daily rolling file in the configured log directory.
//! The level filter sits behind a reload layer so a configuration reload can
//! change it in place.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Registry, fmt, reload};

use crate::error::{IngestError, Result};

/// File name prefix of the process log.
pub const LOG_FILE_NAME: &str = "logbridge.log";

/// Map a configured level name to a filter. Unknown names mean `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Keeps the log writer alive and allows changing the level.
///
/// Dropping it flushes and stops the background writer.
pub struct LoggingHandle {
    _guard: WorkerGuard,
    filter: reload::Handle<LevelFilter, Registry>,
}

impl LoggingHandle {
    /// Apply a new level to every subsequent event.
    pub fn set_level(&self, level: &str) -> Result<()> {
        self.filter
            .reload(parse_level(level))
            .map_err(|e| IngestError::Logging(e.to_string()))
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingHandle").finish_non_exhaustive()
    }
}

fn file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_NAME)
        .build(log_dir)
        .map_err(|e| IngestError::Logging(e.to_string()))
}

/// Install the global subscriber.
///
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(level: &str, log_dir: &Path) -> Result<LoggingHandle> {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(log_dir)?);
    let (filter, handle) = reload::Layer::new(parse_level(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| IngestError::Logging(e.to_string()))?;

    Ok(LoggingHandle {
        _guard: guard,
        filter: handle,
    })
}
