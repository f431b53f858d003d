//! Matcher agent: guards + agent run log around the batch matcher, then
//! threshold / rank / top-N on the persisted results.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::agent_runs::{with_agent_run_log, AgentRunLogParams, AgentRunStore};
use crate::errors::AppError;
use crate::guards::{
    assert_feature_enabled, assert_kill_switch_disarmed, assert_tenant_within_limits, AgentName,
    Guards, AGENT_RUNS_RESOURCE, SCORING_FLAG,
};
use crate::matching::batch::{match_job_to_all_candidates, rank_match_results, BatchMatchContext};
use crate::matching::store::MatchStore;
use crate::models::matching::MatchResultRow;
use crate::scoring::config::ScoringConfig;
use crate::scoring::match_score::MatchReasons;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherRequest {
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub user_id: Option<Uuid>,
    /// Overrides the tenant's `guardrails.min_match_score`.
    pub min_score: Option<i32>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub candidate_id: Uuid,
    pub match_score: i32,
    pub confidence: Option<i32>,
    pub reasons: MatchReasons,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherOutput {
    pub job_id: Uuid,
    pub evaluated: usize,
    pub threshold: i32,
    pub matches: Vec<RankedMatch>,
}

/// Collaborators the matcher needs. All are satisfied by `PgStore` in production.
#[derive(Clone, Copy)]
pub struct MatcherDeps<'a> {
    pub store: &'a dyn MatchStore,
    pub runs: &'a dyn AgentRunStore,
    pub guards: &'a dyn Guards,
}

/// Drops results below `threshold`, ranks the rest and keeps the first `top_n`.
pub fn select_top_matches(mut results: Vec<MatchResultRow>, threshold: i32, top_n: usize) -> Vec<RankedMatch> {
    results.retain(|r| r.score >= threshold);
    rank_match_results(&mut results);
    results
        .into_iter()
        .take(top_n)
        .map(|r| RankedMatch {
            candidate_id: r.candidate_id,
            match_score: r.score,
            confidence: Some(r.candidate_signal_breakdown.0.confidence.score),
            reasons: r.reasons.0,
        })
        .collect()
}

pub async fn run_matcher(
    deps: MatcherDeps<'_>,
    config: ScoringConfig,
    request: MatcherRequest,
) -> Result<MatcherOutput, AppError> {
    if request.top_n == Some(0) {
        return Err(AppError::Validation("top_n must be at least 1".to_string()));
    }

    let params = AgentRunLogParams {
        agent_name: AgentName::Matcher.as_str().to_string(),
        tenant_id: Some(request.tenant_id),
        user_id: request.user_id,
        input: json!({
            "job_id": request.job_id,
            "min_score": request.min_score,
            "top_n": request.top_n,
        }),
    };

    with_agent_run_log(deps.runs, params, || async {
        assert_kill_switch_disarmed(deps.guards, AgentName::Matcher.as_str()).await?;
        assert_tenant_within_limits(deps.guards, request.tenant_id, AGENT_RUNS_RESOURCE).await?;
        assert_feature_enabled(deps.guards, request.tenant_id, SCORING_FLAG).await?;

        let tenant = deps.guards.tenant_config(request.tenant_id).await?;
        let guardrails = tenant.guardrails.0;
        let threshold = request.min_score.unwrap_or(guardrails.min_match_score);
        let top_n = request.top_n.unwrap_or(DEFAULT_TOP_N);

        let ctx = BatchMatchContext {
            tenant_id: request.tenant_id,
            job_id: request.job_id,
            config,
            guardrails,
        };
        let results = match_job_to_all_candidates(deps.store, &ctx).await?;
        let evaluated = results.len();
        let matches = select_top_matches(results, threshold, top_n);

        deps.guards
            .record_usage(request.tenant_id, AGENT_RUNS_RESOURCE, 1)
            .await?;

        info!(
            tenant_id = %request.tenant_id,
            job_id = %request.job_id,
            evaluated,
            kept = matches.len(),
            threshold,
            "Matcher finished"
        );

        Ok(MatcherOutput {
            job_id: request.job_id,
            evaluated,
            threshold,
            matches,
        })
    })
    .await
}
