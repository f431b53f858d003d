//! Axum route handlers for matching, candidate confidence and match feedback.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::agent::{run_matcher, MatcherDeps, MatcherOutput, MatcherRequest};
use crate::matching::feedback::{record_match_feedback, FeedbackOutcome, MatchFeedbackInput};
use crate::matching::store::MatchStore;
use crate::scoring::confidence::{compute_candidate_confidence_score, ConfidenceResult};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MatchJobRequest {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub min_score: Option<i32>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ConfidenceRequest {
    pub tenant_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConfidenceResponse {
    pub candidate_id: Uuid,
    pub confidence: ConfidenceResult,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/jobs/:job_id/match
///
/// Runs the matcher agent for the job and returns the ranked, thresholded matches.
pub async fn handle_match_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(request): Json<MatchJobRequest>,
) -> Result<Json<MatcherOutput>, AppError> {
    let deps = MatcherDeps {
        store: &state.store,
        runs: &state.store,
        guards: &state.store,
    };
    let output = run_matcher(
        deps,
        state.scoring,
        MatcherRequest {
            tenant_id: request.tenant_id,
            job_id,
            user_id: request.user_id,
            min_score: request.min_score,
            top_n: request.top_n,
        },
    )
    .await?;

    Ok(Json(output))
}

/// POST /api/v1/candidates/:candidate_id/confidence
///
/// Scores the candidate profile and persists the result as `trust_score`.
pub async fn handle_candidate_confidence(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
    Json(request): Json<ConfidenceRequest>,
) -> Result<Json<ConfidenceResponse>, AppError> {
    let store: &dyn MatchStore = &state.store;
    let candidate = store
        .load_candidate(request.tenant_id, candidate_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))?;

    let confidence = compute_candidate_confidence_score(&candidate, &state.scoring.confidence_weights);
    store
        .update_trust_score(request.tenant_id, candidate_id, confidence.score as f64)
        .await?;

    info!(%candidate_id, score = confidence.score, "Candidate confidence updated");
    Ok(Json(ConfidenceResponse {
        candidate_id,
        confidence,
    }))
}

/// POST /api/v1/match-feedback
pub async fn handle_match_feedback(
    State(state): State<AppState>,
    Json(input): Json<MatchFeedbackInput>,
) -> Result<Json<FeedbackOutcome>, AppError> {
    if input.notes.as_deref().map(str::len).unwrap_or(0) > 4000 {
        return Err(AppError::Validation("notes must be at most 4000 characters".to_string()));
    }

    let outcome = record_match_feedback(&state.store, &state.store, input, Utc::now()).await?;
    Ok(Json(outcome))
}
