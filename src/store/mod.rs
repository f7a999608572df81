//! Persistence layer — libSQL-backed storage for messages and providers.

pub mod libsql_backend;
pub mod migrations;

pub use libsql_backend::LibSqlBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::error::DatabaseError;

/// Result of a conditional insert keyed on `external_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same `external_id` already exists. Also returned when
    /// a concurrent sync won the race on the uniqueness constraint.
    AlreadyExists,
}

/// Fields for a new message row. Classification fields start empty and are
/// filled in later by the enrichment worker.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub external_id: String,
    pub subject: String,
    pub sender: String,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
}

/// A persisted message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub external_id: String,
    pub subject: String,
    pub sender: String,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
    /// Mirrors the source's read flag at ingestion time; not kept live-synced.
    pub is_read: bool,
    pub priority_score: Option<i64>,
    pub ai_confidence: Option<f64>,
    pub category: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A configured external intelligence backend, including its credential and
/// rolling health counters. Only handed out to the provider router.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    pub name: String,
    pub credential: SecretString,
    /// Lower is tried first; ties broken by name ascending.
    pub priority: i64,
    pub active: bool,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Cumulative mean over every completed call, success or failure.
    pub avg_response_ms: f64,
}

/// Provider upsert input. `name` is the upsert key: submitting an existing
/// name updates credential/priority/active in place.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub credential: SecretString,
    pub priority: i64,
    pub active: bool,
}

/// Listing view of a provider. Deliberately has no credential field so no
/// read path can leak the secret.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub priority: i64,
    pub active: bool,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub avg_response_ms: f64,
}

/// Backend-agnostic database trait covering messages and providers.
///
/// The ingestion engine is the only writer of message rows; the provider
/// router is the only writer of provider counters.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Messages ────────────────────────────────────────────────────

    /// Insert a message unless a row with the same `external_id` exists.
    /// The uniqueness constraint lives in the store, so concurrent callers
    /// racing on the same id resolve here, not via in-process locking.
    async fn insert_message_if_absent(
        &self,
        message: &NewMessage,
    ) -> Result<InsertOutcome, DatabaseError>;

    /// Look up a message by its host-assigned external ID.
    async fn get_message_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<StoredMessage>, DatabaseError>;

    /// Most recent messages first, up to `limit`.
    async fn list_recent_messages(&self, limit: usize) -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Messages not yet classified (no `processed_at`), oldest first.
    async fn list_unprocessed_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Attach a classification result and stamp `processed_at`.
    async fn set_message_classification(
        &self,
        id: &str,
        priority_score: i64,
        confidence: f64,
        category: &str,
    ) -> Result<(), DatabaseError>;

    // ── Providers ───────────────────────────────────────────────────

    /// Create or update a provider record by name. Health counters are
    /// preserved on update.
    async fn upsert_provider(&self, config: &ProviderConfig) -> Result<(), DatabaseError>;

    /// Get a full provider record, credential included.
    async fn get_provider(&self, name: &str) -> Result<Option<ProviderRecord>, DatabaseError>;

    /// Active providers ordered by priority ascending, name ascending.
    async fn list_active_providers_by_priority(
        &self,
    ) -> Result<Vec<ProviderRecord>, DatabaseError>;

    /// All providers as credential-free summaries, priority order.
    async fn list_providers(&self) -> Result<Vec<ProviderSummary>, DatabaseError>;

    /// Record a successful call: bump `success_count`, stamp
    /// `last_success_at`, fold `elapsed_ms` into the running mean.
    /// Must be atomic per record.
    async fn record_provider_success(
        &self,
        name: &str,
        elapsed_ms: f64,
    ) -> Result<(), DatabaseError>;

    /// Record a failed call: bump `failure_count`, stamp `last_failure_at`,
    /// fold `elapsed_ms` into the running mean. Must be atomic per record.
    async fn record_provider_failure(
        &self,
        name: &str,
        elapsed_ms: f64,
    ) -> Result<(), DatabaseError>;
}
