use axum::{
    extract::{Path, State},
    Json,
};

use crate::cron::runner::{CronJobError, CronRunOutcome};
use crate::state::AppState;

/// POST /api/v1/cron/:job_name
///
/// Manual trigger. Failures respond with the error and the job state it left behind.
pub async fn handle_run_cron_job(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> Result<Json<CronRunOutcome>, CronJobError> {
    Ok(Json(state.cron.run_cron_job(&job_name).await?))
}

pub async fn handle_list_cron_jobs(State(state): State<AppState>) -> Json<Vec<&'static str>> {
    Json(state.cron.job_names())
}
