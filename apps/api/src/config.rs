use anyhow::{Context, Result};

use crate::learning::aggregate::DEFAULT_MIN_SAMPLE_SIZE;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub rust_log: String,
    pub scheduler: SchedulerConfig,
    /// Signals with a smaller sample size never reach the shared aggregates.
    pub learning_min_sample_size: i32,
    pub signal_retention_days: i64,
    pub market_cache_ttl_secs: u64,
}

/// Cron expressions (tokio-cron-scheduler, seconds first) for each scheduled job.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub learning_cron: String,
    pub ete_index_cron: String,
    pub health_cron: String,
    pub retention_cron: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            scheduler: SchedulerConfig {
                enabled: std::env::var("ETE_SCHEDULER_ENABLED")
                    .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                    .unwrap_or(false),
                // Mondays 03:00 UTC, after the week rolls over.
                learning_cron: env_or("ETE_CRON_LEARNING", "0 0 3 * * Mon"),
                ete_index_cron: env_or("ETE_CRON_ETE_INDEX", "0 30 3 * * Mon"),
                health_cron: env_or("ETE_CRON_HEALTH", "0 */5 * * * *"),
                retention_cron: env_or("ETE_CRON_RETENTION", "0 0 4 * * *"),
            },
            learning_min_sample_size: parse_env("ETE_LEARNING_MIN_SAMPLE", DEFAULT_MIN_SAMPLE_SIZE)?,
            signal_retention_days: parse_env("ETE_SIGNAL_RETENTION_DAYS", 365)?,
            market_cache_ttl_secs: parse_env("ETE_MARKET_CACHE_TTL_SECS", 900)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
