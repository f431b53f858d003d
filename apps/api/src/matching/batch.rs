//! Batch matcher: score one job against every active candidate of the tenant.
//!
//! Each candidate's match result and pipeline link are written in their own
//! transaction. A failing candidate is rolled back and the remaining candidates
//! are still processed; the first error is returned once the batch is done.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::store::{with_transaction, JobCandidateLink, MatchStore, NewMatchResult};
use crate::models::matching::MatchResultRow;
use crate::models::tenant::Guardrails;
use crate::scoring::confidence::compute_candidate_confidence_score;
use crate::scoring::config::ScoringConfig;
use crate::scoring::match_score::compute_match_score;
use crate::scoring::signals::compute_candidate_signals;

#[derive(Debug, Clone)]
pub struct BatchMatchContext {
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub config: ScoringConfig,
    /// Snapshotted into every result's reasons.
    pub guardrails: Guardrails,
}

/// Highest score first, ties broken by candidate id.
pub fn rank_match_results(results: &mut [MatchResultRow]) {
    results.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
}

pub async fn match_job_to_all_candidates(
    store: &dyn MatchStore,
    ctx: &BatchMatchContext,
) -> Result<Vec<MatchResultRow>, AppError> {
    let job = store
        .load_job(ctx.tenant_id, ctx.job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", ctx.job_id)))?;

    let candidates = store.load_active_candidates(ctx.tenant_id).await?;
    if candidates.is_empty() {
        info!(job_id = %ctx.job_id, "No active candidates to match");
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = candidates.iter().map(|c| c.profile.id).collect();
    let engagement: HashMap<Uuid, _> = store
        .load_engagement(ctx.tenant_id, &ids)
        .await?
        .into_iter()
        .map(|row| (row.candidate_id, row))
        .collect();

    let mut results = Vec::with_capacity(candidates.len());
    let mut first_error: Option<AppError> = None;

    for candidate in &candidates {
        let candidate_id = candidate.profile.id;
        let confidence = compute_candidate_confidence_score(candidate, &ctx.config.confidence_weights);
        let signals = compute_candidate_signals(confidence, engagement.get(&candidate_id));
        let mut score = compute_match_score(candidate, &job, &signals, &ctx.config.match_weights);
        score.reasons.guardrails = Some(ctx.guardrails.clone());

        let now = Utc::now();
        let new = NewMatchResult {
            tenant_id: ctx.tenant_id,
            job_req_id: ctx.job_id,
            candidate_id,
            score,
            created_at: now,
        };

        let written = with_transaction(store, move |tx| {
            Box::pin(async move {
                let row = tx.create_match_result(new).await?;
                tx.upsert_job_candidate(JobCandidateLink {
                    tenant_id: row.tenant_id,
                    job_req_id: row.job_req_id,
                    candidate_id: row.candidate_id,
                    match_id: row.id,
                    touched_at: now,
                })
                .await?;
                Ok(row)
            })
        })
        .await;

        match written {
            Ok(row) => results.push(row),
            Err(err) => {
                warn!(job_id = %ctx.job_id, candidate_id = %candidate_id, error = %err, "Match write rolled back");
                first_error.get_or_insert(err);
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    rank_match_results(&mut results);
    info!(job_id = %ctx.job_id, matched = results.len(), "Batch match complete");
    Ok(results)
}
