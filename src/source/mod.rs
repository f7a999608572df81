//! Message source abstraction — an ordered feed of raw mailbox records.
//!
//! The mailbox host itself (Outlook, IMAP, whatever) lives behind this trait.
//! The ingestion engine only ever sees plain `RawMessage` records, most
//! recent first, and a distinguishable "source unavailable" condition when
//! the host cannot be reached.

pub mod replay;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub use replay::ReplaySource;

/// Kind of item reported by the mailbox host.
///
/// Only `Mail` items are ingested; everything else is filtered out silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Mail,
    Meeting,
    Contact,
    #[serde(other)]
    Other,
}

/// One raw record as exposed by the mailbox host.
///
/// Optional fields may be absent on the host side; the ingestion engine
/// defaults them rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Stable identifier assigned by the mailbox host. The dedup key.
    pub external_id: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub body_text: Option<String>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub is_unread: bool,
}

/// Stream of raw records. A mid-iteration `Err` means the source went away;
/// the consumer keeps whatever it already committed.
pub type MessageStream<'a> = BoxStream<'a, std::result::Result<RawMessage, SourceError>>;

/// An external mailbox host, reduced to a lazy, restartable record feed.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Stream up to `limit` records, ordered by receipt time descending.
    ///
    /// Failing to establish the feed at all is an `Err`; a connection lost
    /// mid-iteration surfaces as an `Err` item in the stream.
    async fn list_recent(&self, limit: usize) -> std::result::Result<MessageStream<'_>, SourceError>;
}
