use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::forecast::time_to_fill::{evaluate_time_to_fill_risk, ForecastStore, TimeToFillRisk};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TimeToFillQuery {
    pub tenant_id: Uuid,
}

/// GET /api/v1/forecast/time-to-fill?tenant_id=
pub async fn handle_time_to_fill(
    State(state): State<AppState>,
    Query(query): Query<TimeToFillQuery>,
) -> Result<Json<Vec<TimeToFillRisk>>, AppError> {
    let store: &dyn ForecastStore = &state.store;
    let inputs = store.load_forecast_inputs(query.tenant_id).await?;
    debug!(tenant_id = %query.tenant_id, jobs = inputs.len(), "Evaluating time-to-fill risk");
    Ok(Json(evaluate_time_to_fill_risk(&inputs, Utc::now())))
}
