//! Shortlist stage: surface the strongest latest matches of a job, bounded by the
//! tenant's guardrails.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::agent_runs::pipeline::StepOutcome;
use crate::errors::AppError;
use crate::matching::batch::rank_match_results;
use crate::matching::store::MatchStore;
use crate::models::matching::MatchResultRow;
use crate::models::tenant::Guardrails;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistEntry {
    pub candidate_id: Uuid,
    pub match_result_id: Uuid,
    pub score: i32,
    pub reason: String,
}

/// Pure selection over the latest match per candidate.
pub fn select_shortlist(mut latest: Vec<MatchResultRow>, guardrails: &Guardrails) -> Vec<ShortlistEntry> {
    latest.retain(|m| m.score >= guardrails.shortlist_min_score);
    rank_match_results(&mut latest);

    latest
        .into_iter()
        .take(guardrails.shortlist_max)
        .enumerate()
        .map(|(i, m)| ShortlistEntry {
            candidate_id: m.candidate_id,
            match_result_id: m.id,
            score: m.score,
            reason: format!(
                "Ranked {} of {} with score {} (threshold {})",
                i + 1,
                guardrails.shortlist_max,
                m.score,
                guardrails.shortlist_min_score
            ),
        })
        .collect()
}

pub async fn run_shortlist(
    store: &dyn MatchStore,
    tenant_id: Uuid,
    job_id: Uuid,
    guardrails: &Guardrails,
) -> Result<StepOutcome<Vec<ShortlistEntry>>, AppError> {
    if store.load_job(tenant_id, job_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Job {job_id} not found")));
    }

    let latest = store.latest_matches_for_job(tenant_id, job_id).await?;
    let considered = latest.len() as i64;
    let entries = select_shortlist(latest, guardrails);

    for entry in &entries {
        store.mark_shortlisted(entry.match_result_id, &entry.reason).await?;
    }

    info!(%job_id, considered, shortlisted = entries.len(), "Shortlist built");
    let shortlisted = entries.len() as i64;
    Ok(StepOutcome::new(entries)
        .with_count("considered", considered)
        .with_count("shortlisted", shortlisted))
}
