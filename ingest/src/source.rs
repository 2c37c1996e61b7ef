//! Where records come from.

use std::path::Path;

use async_trait::async_trait;
use logbridge_event_log::{EventRecord, ParseError, parse_str};

/// Turns a discovered file into its records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Parse `path` into records in file order.
    async fn parse(&self, path: &Path) -> Result<Vec<EventRecord>, ParseError>;
}

/// Reads 1C:Enterprise event-log XML exports.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRecordSource;

#[async_trait]
impl RecordSource for XmlRecordSource {
    async fn parse(&self, path: &Path) -> Result<Vec<EventRecord>, ParseError> {
        let content = tokio::fs::read_to_string(path).await?;
        parse_str(&content)
    }
}
