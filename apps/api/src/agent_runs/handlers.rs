//! Axum route handlers for pipeline stages.

use std::str::FromStr;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agent_runs::pipeline::{run_pipeline_step, PipelineStepOptions, PipelineStepResult, StepOutcome};
use crate::errors::AppError;
use crate::guards::{AgentName, Guards};
use crate::matching::agent::{run_matcher, MatcherDeps, MatcherRequest};
use crate::matching::shortlist::run_shortlist;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Match,
    Shortlist,
}

impl PipelineStage {
    fn agent(&self) -> AgentName {
        match self {
            PipelineStage::Match => AgentName::Matcher,
            PipelineStage::Shortlist => AgentName::Shortlist,
        }
    }
}

impl FromStr for PipelineStage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match" => Ok(PipelineStage::Match),
            "shortlist" => Ok(PipelineStage::Shortlist),
            other => Err(AppError::Validation(format!("Unknown pipeline stage '{other}'"))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PipelineStepRequest {
    pub tenant_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub skip_reason: Option<String>,
    pub min_score: Option<i32>,
    pub top_n: Option<usize>,
    pub prompt_meta: Option<Value>,
}

/// POST /api/v1/jobs/:job_id/pipeline/:stage
///
/// Runs one pipeline stage through the pipeline runner. An engaged kill switch
/// for the stage's agent turns the step into a skip instead of an error.
pub async fn handle_pipeline_step(
    State(state): State<AppState>,
    Path((job_id, stage)): Path<(Uuid, String)>,
    Json(request): Json<PipelineStepRequest>,
) -> Result<Json<PipelineStepResult<Value>>, AppError> {
    let stage: PipelineStage = stage.parse()?;
    let agent = stage.agent();

    let tenant = state.store.tenant_config(request.tenant_id).await?;
    let guardrails = tenant.guardrails.0.clone();
    let kill_switch = state
        .store
        .kill_switch_reason(agent.as_str())
        .await?
        .map(|reason| format!("Kill switch engaged for {}: {reason}", agent.as_str()));

    let options = PipelineStepOptions {
        agent_name: agent.as_str().to_string(),
        tenant_id: request.tenant_id,
        requested_by: request.requested_by,
        job_id: Some(job_id),
        mode: tenant.mode(),
        prompt_meta: request.prompt_meta.clone(),
        input: json!({
            "job_id": job_id,
            "stage": format!("{stage:?}").to_lowercase(),
            "min_score": request.min_score,
            "top_n": request.top_n,
        }),
        skip_reason: request.skip_reason.clone().or(kill_switch),
    };

    let result = match stage {
        PipelineStage::Match => {
            run_pipeline_step(&state.store, options, || async {
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
                        user_id: request.requested_by,
                        min_score: request.min_score,
                        top_n: request.top_n,
                    },
                )
                .await?;
                let evaluated = output.evaluated as i64;
                let kept = output.matches.len() as i64;
                let results = serde_json::to_value(&output.matches)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize matches: {e}")))?;
                Ok(StepOutcome::new(results)
                    .with_count("evaluated", evaluated)
                    .with_count("matched", kept))
            })
            .await?
        }
        PipelineStage::Shortlist => {
            run_pipeline_step(&state.store, options, || async {
                let outcome = run_shortlist(&state.store, request.tenant_id, job_id, &guardrails).await?;
                let results = serde_json::to_value(&outcome.results)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize shortlist: {e}")))?;
                Ok(StepOutcome {
                    results,
                    counts: outcome.counts,
                    outreach_interactions: outcome.outreach_interactions,
                    token_usage: outcome.token_usage,
                })
            })
            .await?
        }
    };

    Ok(Json(result))
}
