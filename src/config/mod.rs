//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub anthropic_api_key: SecretString,
    pub generation_model: String,
    pub tracker_token: SecretString,
    pub tracker_database_id: String,

    /// Endpoint templates for the metadata/content/container sources.
    /// `{id}` and `{container}` are substituted per request.
    pub metadata_url: String,
    pub content_url: String,
    pub container_url: String,

    /// Path of the embedded idempotency ledger.
    pub ledger_path: PathBuf,
    /// Path of the persisted governor/breaker state file.
    pub state_path: PathBuf,
    /// Directory for fallback artifacts when the remote write fails.
    pub artifact_dir: PathBuf,

    pub governor: GovernorConfig,
    pub pacing: PacingConfig,

    /// Interval between scheduled passes in continuous mode.
    pub check_interval: Duration,

    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Call budgets for the rate governor.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub max_per_hour: usize,
    pub max_per_day: usize,
    /// Minimum spacing between governed calls.
    pub min_delay: Duration,
    /// Spacing multiplier applied per consecutive failure.
    pub backoff_multiplier: f64,
    /// Longest spacing wait the caller should honor; beyond it, deny.
    pub max_wait: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_per_hour: 50,
            max_per_day: 200,
            min_delay: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            max_wait: Duration::from_secs(60),
        }
    }
}

/// Inter-call and inter-item pacing for the generation dependency.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Base delay before each generation attempt.
    pub api_call_delay: Duration,
    /// Base delay between items in a batch.
    pub inter_item_delay: Duration,
    /// Extra delay added per accumulated error in a batch.
    pub error_backoff: Duration,
    /// Ceiling on the inter-item delay.
    pub max_inter_item_delay: Duration,
    /// Cap on plain items processed per pass.
    pub max_items_per_run: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            api_call_delay: Duration::from_secs(10),
            inter_item_delay: Duration::from_secs(60),
            error_backoff: Duration::from_secs(30),
            max_inter_item_delay: Duration::from_secs(600),
            max_items_per_run: 15,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let governor = GovernorConfig {
            max_per_hour: env_parse("MAX_CALLS_PER_HOUR", 50)?,
            max_per_day: env_parse("MAX_CALLS_PER_DAY", 200)?,
            min_delay: Duration::from_secs_f64(env_parse("MIN_CALL_DELAY_SECS", 3.0)?),
            backoff_multiplier: env_parse("BACKOFF_MULTIPLIER", 2.0)?,
            max_wait: Duration::from_secs(env_parse("MAX_GOVERNOR_WAIT_SECS", 60)?),
        };

        let pacing = PacingConfig {
            api_call_delay: Duration::from_secs_f64(env_parse("API_CALL_DELAY", 10.0)?),
            inter_item_delay: Duration::from_secs(env_parse("ITEM_PROCESSING_DELAY", 60)?),
            error_backoff: Duration::from_secs(env_parse("ERROR_BACKOFF_SECS", 30)?),
            max_inter_item_delay: Duration::from_secs(env_parse("MAX_PROCESSING_DELAY", 600)?),
            max_items_per_run: env_parse("MAX_ITEMS_PER_RUN", 15)?,
        };

        let interval_hours: f64 = env_parse("CHECK_INTERVAL_HOURS", 0.25)?;

        Ok(Self {
            anthropic_api_key: SecretString::from(required_var("ANTHROPIC_API_KEY")?),
            generation_model: std::env::var("GENERATION_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            tracker_token: SecretString::from(required_var("TRACKER_TOKEN")?),
            tracker_database_id: required_var("TRACKER_DATABASE_ID")?,
            metadata_url: required_var("METADATA_URL")?,
            content_url: required_var("CONTENT_URL")?,
            container_url: required_var("CONTAINER_URL")?,
            ledger_path: path_var("LEDGER_PATH", "distill.db"),
            state_path: path_var("STATE_PATH", "pipeline_state.json"),
            artifact_dir: path_var("ARTIFACT_DIR", "artifact_backups"),
            governor,
            pacing,
            check_interval: Duration::from_secs_f64(interval_hours * 3600.0),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn path_var(name: &str, default: &str) -> PathBuf {
    std::env::var(name).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}
