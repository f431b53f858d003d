//! Axum route handlers for market signals and the ETE index.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;

use crate::errors::AppError;
use crate::guards::Guards;
use crate::market::cache::SignalCache;
use crate::market::ete_index::build_ete_index;
use crate::market::signals::{get_market_signals, MarketSignals, MarketSignalsQuery};
use crate::market::store::MarketStore;
use crate::models::learning::EteIndexSnapshotRow;
use crate::state::AppState;

/// GET /api/v1/market/signals
///
/// When a tenant is given, its configured system mode overrides the query's.
pub async fn handle_market_signals(
    State(state): State<AppState>,
    Query(mut query): Query<MarketSignalsQuery>,
) -> Result<Json<MarketSignals>, AppError> {
    if let Some(tenant_id) = query.tenant_id {
        let guards: &dyn Guards = &state.store;
        query.system_mode = guards.tenant_config(tenant_id).await?.mode();
    }

    let cache: &dyn SignalCache = &state.cache;
    let signals = get_market_signals(
        &state.store,
        Some(cache),
        &query,
        state.config.market_cache_ttl_secs,
        Utc::now(),
    )
    .await?;
    Ok(Json(signals))
}

/// POST /api/v1/market/ete-index
pub async fn handle_build_ete_index(State(state): State<AppState>) -> Result<Json<EteIndexSnapshotRow>, AppError> {
    Ok(Json(build_ete_index(&state.store, Utc::now()).await?))
}

/// GET /api/v1/market/ete-index
pub async fn handle_latest_ete_index(State(state): State<AppState>) -> Result<Json<EteIndexSnapshotRow>, AppError> {
    let store: &dyn MarketStore = &state.store;
    store
        .latest_ete_snapshot()
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No ETE index snapshot has been built yet".to_string()))
}
