//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 TEXT; booleans as INTEGER 0/1.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::{
    Database, InsertOutcome, NewMessage, ProviderConfig, ProviderRecord, ProviderSummary,
    StoredMessage,
};

const MESSAGE_COLUMNS: &str = "id, external_id, subject, sender, body_text, received_at, is_read, \
     priority_score, ai_confidence, category, processed_at, created_at";

const PROVIDER_COLUMNS: &str = "name, credential, priority, active, success_count, failure_count, \
     last_success_at, last_failure_at, avg_response_ms";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// counter updates are single UPDATE statements, so they stay atomic per
/// record without any in-process locking.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let received_str: String = row.get(5)?;
    let processed_str: Option<String> = row.get(10).ok();
    let created_str: String = row.get(11)?;
    let is_read: i64 = row.get(6)?;

    Ok(StoredMessage {
        id: row.get(0)?,
        external_id: row.get(1)?,
        subject: row.get(2)?,
        sender: row.get(3)?,
        body_text: row.get(4)?,
        received_at: parse_datetime(&received_str),
        is_read: is_read != 0,
        priority_score: row.get(7).ok(),
        ai_confidence: row.get(8).ok(),
        category: row.get(9).ok(),
        processed_at: parse_optional_datetime(processed_str),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_provider(row: &libsql::Row) -> Result<ProviderRecord, libsql::Error> {
    let credential: String = row.get(1)?;
    let active: i64 = row.get(3)?;
    let last_success: Option<String> = row.get(6).ok();
    let last_failure: Option<String> = row.get(7).ok();

    Ok(ProviderRecord {
        name: row.get(0)?,
        credential: SecretString::from(credential),
        priority: row.get(2)?,
        active: active != 0,
        success_count: row.get(4)?,
        failure_count: row.get(5)?,
        last_success_at: parse_optional_datetime(last_success),
        last_failure_at: parse_optional_datetime(last_failure),
        avg_response_ms: row.get(8)?,
    })
}

fn query_err(op: &str, e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Query(format!("{op}: {e}"))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn insert_message_if_absent(
        &self,
        message: &NewMessage,
    ) -> Result<InsertOutcome, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO messages \
                     (id, external_id, subject, sender, body_text, received_at, is_read, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.clone(),
                    message.external_id.clone(),
                    message.subject.clone(),
                    message.sender.clone(),
                    message.body_text.clone(),
                    message.received_at.to_rfc3339(),
                    message.is_read as i64,
                    now,
                ],
            )
            .await
            .map_err(|e| query_err("insert_message_if_absent", e))?;

        if affected == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            debug!(id = %id, external_id = %message.external_id, "Message inserted into DB");
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn get_message_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE external_id = ?1"),
                params![external_id],
            )
            .await
            .map_err(|e| query_err("get_message_by_external_id", e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let msg = row_to_message(&row)
                    .map_err(|e| query_err("get_message_by_external_id row parse", e))?;
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(query_err("get_message_by_external_id", e)),
        }
    }

    async fn list_recent_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     ORDER BY received_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| query_err("list_recent_messages", e))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            out.push(
                row_to_message(&row).map_err(|e| query_err("list_recent_messages row parse", e))?,
            );
        }
        Ok(out)
    }

    async fn list_unprocessed_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE processed_at IS NULL \
                     ORDER BY received_at ASC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| query_err("list_unprocessed_messages", e))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            out.push(
                row_to_message(&row)
                    .map_err(|e| query_err("list_unprocessed_messages row parse", e))?,
            );
        }
        Ok(out)
    }

    async fn set_message_classification(
        &self,
        id: &str,
        priority_score: i64,
        confidence: f64,
        category: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE messages SET priority_score = ?1, ai_confidence = ?2, \
                     category = ?3, processed_at = ?4 \
                 WHERE id = ?5",
                params![priority_score, confidence, category, now, id],
            )
            .await
            .map_err(|e| query_err("set_message_classification", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "message".to_string(),
                id: id.to_string(),
            });
        }
        debug!(id = %id, category = %category, "Message classification stored");
        Ok(())
    }

    async fn upsert_provider(&self, config: &ProviderConfig) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO providers (name, credential, priority, active, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                 ON CONFLICT(name) DO UPDATE SET \
                     credential = excluded.credential, \
                     priority = excluded.priority, \
                     active = excluded.active, \
                     updated_at = excluded.updated_at",
                params![
                    config.name.clone(),
                    config.credential.expose_secret(),
                    config.priority,
                    config.active as i64,
                    now,
                ],
            )
            .await
            .map_err(|e| query_err("upsert_provider", e))?;

        debug!(name = %config.name, priority = config.priority, "Provider upserted");
        Ok(())
    }

    async fn get_provider(&self, name: &str) -> Result<Option<ProviderRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE name = ?1"),
                params![name],
            )
            .await
            .map_err(|e| query_err("get_provider", e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record =
                    row_to_provider(&row).map_err(|e| query_err("get_provider row parse", e))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(query_err("get_provider", e)),
        }
    }

    async fn list_active_providers_by_priority(
        &self,
    ) -> Result<Vec<ProviderRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROVIDER_COLUMNS} FROM providers \
                     WHERE active = 1 ORDER BY priority ASC, name ASC"
                ),
                (),
            )
            .await
            .map_err(|e| query_err("list_active_providers_by_priority", e))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            out.push(
                row_to_provider(&row)
                    .map_err(|e| query_err("list_active_providers_by_priority row parse", e))?,
            );
        }
        Ok(out)
    }

    async fn list_providers(&self) -> Result<Vec<ProviderSummary>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROVIDER_COLUMNS} FROM providers \
                     ORDER BY priority ASC, name ASC"
                ),
                (),
            )
            .await
            .map_err(|e| query_err("list_providers", e))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let record =
                row_to_provider(&row).map_err(|e| query_err("list_providers row parse", e))?;
            out.push(ProviderSummary {
                name: record.name,
                priority: record.priority,
                active: record.active,
                success_count: record.success_count,
                failure_count: record.failure_count,
                last_success_at: record.last_success_at,
                last_failure_at: record.last_failure_at,
                avg_response_ms: record.avg_response_ms,
            });
        }
        Ok(out)
    }

    async fn record_provider_success(
        &self,
        name: &str,
        elapsed_ms: f64,
    ) -> Result<(), DatabaseError> {
        // Single statement so the read-modify-write is atomic per record.
        // Column references on the right-hand side are pre-update values, so
        // the divisor is the call count including this call.
        let affected = self
            .conn()
            .execute(
                "UPDATE providers SET \
                     success_count = success_count + 1, \
                     last_success_at = ?1, \
                     avg_response_ms = avg_response_ms \
                         + (?2 - avg_response_ms) / (success_count + failure_count + 1) \
                 WHERE name = ?3",
                params![Utc::now().to_rfc3339(), elapsed_ms, name],
            )
            .await
            .map_err(|e| query_err("record_provider_success", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "provider".to_string(),
                id: name.to_string(),
            });
        }
        Ok(())
    }

    async fn record_provider_failure(
        &self,
        name: &str,
        elapsed_ms: f64,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE providers SET \
                     failure_count = failure_count + 1, \
                     last_failure_at = ?1, \
                     avg_response_ms = avg_response_ms \
                         + (?2 - avg_response_ms) / (success_count + failure_count + 1) \
                 WHERE name = ?3",
                params![Utc::now().to_rfc3339(), elapsed_ms, name],
            )
            .await
            .map_err(|e| query_err("record_provider_failure", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "provider".to_string(),
                id: name.to_string(),
            });
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
