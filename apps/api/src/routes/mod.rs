pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::agent_runs::handlers as pipeline;
use crate::cron::handlers as cron;
use crate::forecast::handlers as forecast;
use crate::market::handlers as market;
use crate::matching::handlers as matching;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Matching
        .route("/api/v1/jobs/:job_id/match", post(matching::handle_match_job))
        .route(
            "/api/v1/jobs/:job_id/pipeline/:stage",
            post(pipeline::handle_pipeline_step),
        )
        .route(
            "/api/v1/candidates/:candidate_id/confidence",
            post(matching::handle_candidate_confidence),
        )
        .route("/api/v1/match-feedback", post(matching::handle_match_feedback))
        // Market intelligence
        .route("/api/v1/market/signals", get(market::handle_market_signals))
        .route(
            "/api/v1/market/ete-index",
            get(market::handle_latest_ete_index).post(market::handle_build_ete_index),
        )
        .route("/api/v1/forecast/time-to-fill", get(forecast::handle_time_to_fill))
        // Cron
        .route("/api/v1/cron", get(cron::handle_list_cron_jobs))
        .route("/api/v1/cron/:job_name", post(cron::handle_run_cron_job))
        .with_state(state)
}
