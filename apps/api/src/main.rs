mod agent_runs;
mod config;
mod cron;
mod db;
mod errors;
mod forecast;
mod guards;
mod learning;
mod market;
mod matching;
mod models;
mod routes;
mod scoring;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::cron::jobs::{EteIndexJob, HealthCheckJob, LearningAggregationJob, SignalRetentionJob};
use crate::cron::runner::CronRunner;
use crate::cron::scheduler::start_scheduler;
use crate::db::create_pool;
use crate::market::cache::RedisSignalCache;
use crate::routes::build_router;
use crate::scoring::config::ScoringConfig;
use crate::state::AppState;
use crate::store::PgStore;

/// Registers every scheduled job against the Postgres store.
fn build_cron_runner(store: &PgStore, config: &Config) -> CronRunner {
    let shared = Arc::new(store.clone());
    CronRunner::new(shared.clone(), shared.clone(), shared.clone())
        .register(Arc::new(LearningAggregationJob {
            store: shared.clone(),
            min_sample_size: config.learning_min_sample_size,
        }))
        .register(Arc::new(EteIndexJob { store: shared.clone() }))
        .register(Arc::new(HealthCheckJob {
            pool: store.pool().clone(),
        }))
        .register(Arc::new(SignalRetentionJob {
            store: shared,
            retention_days: config.signal_retention_days,
        }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME").replace('-', "_"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ETE API v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;

    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let store = PgStore::new(db);
    let cron = Arc::new(build_cron_runner(&store, &config));
    info!(jobs = ?cron.job_names(), "Cron runner initialized");

    // Keep the scheduler alive for the lifetime of the server.
    let _scheduler = start_scheduler(cron.clone(), &config.scheduler).await?;

    let state = AppState {
        redis: redis.clone(),
        config: config.clone(),
        store,
        scoring: ScoringConfig::default(),
        cron,
        cache: RedisSignalCache::new(redis),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
