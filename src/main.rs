use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use mail_triage::classify::{Classifier, spawn_classify_worker};
use mail_triage::config::{AppConfig, provider_seeds_from_env};
use mail_triage::ingest::{IngestEngine, spawn_sync_poller};
use mail_triage::provider::{HttpProviderClient, ProviderRouter};
use mail_triage::source::{MessageSource, ReplaySource};
use mail_triage::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("📬 Mail Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    // ── Provider pool ────────────────────────────────────────────────────
    let seeds = provider_seeds_from_env()?;
    for provider in &seeds {
        db.upsert_provider(provider).await?;
    }
    let pool = db.list_providers().await?;
    if pool.is_empty() {
        eprintln!("   Providers: none configured (set GROQ_API_KEY / OPENAI_API_KEY / GEMINI_API_KEY)");
    } else {
        for p in &pool {
            eprintln!(
                "   Provider: {} (priority {}, {})",
                p.name,
                p.priority,
                if p.active { "active" } else { "inactive" }
            );
        }
    }

    // ── Message source ───────────────────────────────────────────────────
    let Some(replay_path) = &config.replay_path else {
        eprintln!("Error: MAIL_TRIAGE_REPLAY_PATH not set — no message source configured");
        eprintln!("  export MAIL_TRIAGE_REPLAY_PATH=./export.json");
        std::process::exit(1);
    };
    let source: Arc<dyn MessageSource> = Arc::new(ReplaySource::from_path(replay_path)?);
    eprintln!("   Source: replay of {}", replay_path.display());

    // ── Ingestion ────────────────────────────────────────────────────────
    let engine = Arc::new(IngestEngine::new(source, Arc::clone(&db)));
    let (sync_handle, sync_shutdown) =
        spawn_sync_poller(engine, config.sync_interval_secs, config.sync_limit);

    // ── Classification ───────────────────────────────────────────────────
    let router = ProviderRouter::new(Arc::clone(&db), Arc::new(HttpProviderClient::new()))
        .with_call_timeout(Duration::from_secs(config.call_timeout_secs));
    let classifier = Arc::new(Classifier::new(router));
    let (classify_handle, classify_shutdown) = spawn_classify_worker(
        Arc::clone(&db),
        classifier,
        config.classify_interval_secs,
        config.classify_batch,
    );

    eprintln!(
        "   Sync: every {}s (limit {}) — Classify: every {}s\n",
        config.sync_interval_secs, config.sync_limit, config.classify_interval_secs
    );

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down...");
    sync_shutdown.store(true, Ordering::Relaxed);
    classify_shutdown.store(true, Ordering::Relaxed);
    sync_handle.abort();
    classify_handle.abort();

    Ok(())
}
