//! Configuration from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::store::ProviderConfig;

/// Known provider backends with their credential variable and default rank.
/// Order matches the default priority: groq first, then openai, then gemini.
const PROVIDER_SEEDS: &[(&str, &str, i64)] = &[
    ("groq", "GROQ_API_KEY", 1),
    ("openai", "OPENAI_API_KEY", 2),
    ("gemini", "GEMINI_API_KEY", 3),
];

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Seconds between sync runs.
    pub sync_interval_secs: u64,
    /// Max messages examined per sync run.
    pub sync_limit: usize,
    /// Seconds between classification sweeps.
    pub classify_interval_secs: u64,
    /// Max messages classified per sweep.
    pub classify_batch: usize,
    /// Per-candidate provider call timeout, seconds.
    pub call_timeout_secs: u64,
    /// JSON record export to replay as the message source.
    pub replay_path: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from environment variables, with defaults for everything.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            db_path: std::env::var("MAIL_TRIAGE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/mail-triage.db")),
            sync_interval_secs: env_parse("MAIL_TRIAGE_SYNC_INTERVAL_SECS", 300)?,
            sync_limit: env_parse("MAIL_TRIAGE_SYNC_LIMIT", 50)?,
            classify_interval_secs: env_parse("MAIL_TRIAGE_CLASSIFY_INTERVAL_SECS", 60)?,
            classify_batch: env_parse("MAIL_TRIAGE_CLASSIFY_BATCH", 20)?,
            call_timeout_secs: env_parse("MAIL_TRIAGE_CALL_TIMEOUT_SECS", 30)?,
            replay_path: std::env::var("MAIL_TRIAGE_REPLAY_PATH")
                .ok()
                .map(PathBuf::from),
        })
    }
}

/// Provider records seeded from the environment.
///
/// A provider is configured when its API key variable is set; priority can
/// be overridden with `MAIL_TRIAGE_<NAME>_PRIORITY`.
pub fn provider_seeds_from_env() -> Result<Vec<ProviderConfig>, ConfigError> {
    let mut providers = Vec::new();
    for (name, key_var, default_priority) in PROVIDER_SEEDS {
        let Ok(key) = std::env::var(key_var) else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        let priority_var = format!("MAIL_TRIAGE_{}_PRIORITY", name.to_uppercase());
        let priority = env_parse(&priority_var, *default_priority)?;
        providers.push(ProviderConfig {
            name: name.to_string(),
            credential: SecretString::from(key),
            priority,
            active: true,
        });
    }
    Ok(providers)
}

/// Parse an environment variable, falling back to `default` when unset.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
