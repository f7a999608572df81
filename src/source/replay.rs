//! Replay source — serves mailbox records from a JSON export file.
//!
//! Lets the daemon run against a batch of exported records where a live host
//! adapter would otherwise plug in. Records are served most recent first,
//! matching the ordering contract of `MessageSource`.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use crate::error::SourceError;
use crate::source::{MessageSource, MessageStream, RawMessage};

/// A `MessageSource` backed by a JSON array of `RawMessage` records.
#[derive(Debug)]
pub struct ReplaySource {
    records: Vec<RawMessage>,
}

impl ReplaySource {
    /// Load records from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let source = Self::from_json(&raw)?;
        info!(path = %path.display(), records = source.records.len(), "Replay source loaded");
        Ok(source)
    }

    /// Parse records from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, SourceError> {
        let mut records: Vec<RawMessage> =
            serde_json::from_str(raw).map_err(|e| SourceError::Malformed {
                reason: format!("invalid record export: {e}"),
            })?;
        // Receipt time descending, the order a mailbox host reports them in
        records.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(Self { records })
    }

    /// Build directly from records (tests, fixtures).
    pub fn from_records(mut records: Vec<RawMessage>) -> Self {
        records.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Self { records }
    }
}

#[async_trait]
impl MessageSource for ReplaySource {
    async fn list_recent(&self, limit: usize) -> Result<MessageStream<'_>, SourceError> {
        let items = self.records.iter().take(limit).cloned().map(Ok);
        Ok(futures::stream::iter(items).boxed())
    }
}
