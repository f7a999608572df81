//! Mail triage — mailbox ingestion and provider-routed classification core.

pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod provider;
pub mod source;
pub mod store;
