//! Error types for mail-triage.

use crate::provider::ProviderAttempt;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Message source errors.
///
/// `Unavailable` is reported as a sync-run status, not propagated as a hard
/// failure: records committed before the source went away stay committed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Message source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed source record: {reason}")]
    Malformed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Provider dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A single provider attempt failed. Contained by the router's failover
    /// loop; callers of `dispatch` only ever see the pool-level variants.
    #[error("Provider {provider} call failed: {reason}")]
    CallFailed { provider: String, reason: String },

    #[error("All active providers failed ({} attempted)", .attempts.len())]
    AllProvidersExhausted { attempts: Vec<ProviderAttempt> },

    #[error("No active provider configured")]
    NoProviderConfigured,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Classification errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Provider dispatch failed: {0}")]
    Dispatch(#[from] ProviderError),

    #[error("Unparseable classification response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for mail-triage.
pub type Result<T> = std::result::Result<T, Error>;
