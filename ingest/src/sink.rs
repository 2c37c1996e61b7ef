//! Append-only output streams.
//!
//! Each project gets one JSON-lines file, `{output_dir}/{project}.json`,
//! that a log shipper tails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use logbridge_event_log::EventRecord;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::error::SinkError;

/// Extension of the output files.
pub const OUTPUT_EXTENSION: &str = "json";

/// Destination for decoded records.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Append `records`, in order, to the stream of `project` under
    /// `output_dir`. Returns the number of records written.
    async fn append(
        &self,
        output_dir: &Path,
        project: &str,
        records: &[EventRecord],
    ) -> Result<usize, SinkError>;
}

/// Writes one JSON object per line.
///
/// Appends to the same file are serialized; different files are written
/// concurrently.
#[derive(Debug, Default)]
pub struct JsonLinesSink {
    /// One lock per output file.
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl JsonLinesSink {
    /// Create a new sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the output file for `project`.
    pub fn output_path(output_dir: &Path, project: &str) -> PathBuf {
        output_dir.join(format!("{project}.{OUTPUT_EXTENSION}"))
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

/// Serialize records into newline-terminated JSON, skipping any record
/// that fails to serialize. A skipped record leaves no partial output.
fn encode_lines<T: Serialize>(records: &[T]) -> (Vec<u8>, usize) {
    let mut buffer = Vec::new();
    let mut encoded = 0;
    for record in records {
        match serde_json::to_vec(record) {
            Ok(line) => {
                buffer.extend_from_slice(&line);
                buffer.push(b'\n');
                encoded += 1;
            }
            Err(e) => error!("Failed to serialize event record, skipping: {e}"),
        }
    }
    (buffer, encoded)
}

#[async_trait]
impl Sink for JsonLinesSink {
    async fn append(
        &self,
        output_dir: &Path,
        project: &str,
        records: &[EventRecord],
    ) -> Result<usize, SinkError> {
        let path = Self::output_path(output_dir, project);
        let (buffer, encoded) = encode_lines(records);

        let lock = self.lock_for(&path);
        let _held = lock.lock().await;

        fs::create_dir_all(output_dir)
            .await
            .map_err(|source| SinkError::CreateDirectory {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;

        let write = async {
            file.write_all(&buffer).await?;
            file.flush().await
        };
        write.await.map_err(|source| SinkError::Write {
            path: path.clone(),
            source,
        })?;

        debug!("Appended {encoded} records to {}", path.display());
        Ok(encoded)
    }
}
