use std::sync::Arc;

use redis::Client as RedisClient;

use crate::config::Config;
use crate::cron::runner::CronRunner;
use crate::market::cache::RedisSignalCache;
use crate::scoring::config::ScoringConfig;
use crate::store::PgStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Raw Redis client, kept for callers that need more than the signal cache.
    #[allow(dead_code)]
    pub redis: RedisClient,
    pub config: Config,
    /// Postgres implementation of every store trait.
    pub store: PgStore,
    pub scoring: ScoringConfig,
    pub cron: Arc<CronRunner>,
    /// Market signal cache, backed by the same Redis client.
    pub cache: RedisSignalCache,
}
