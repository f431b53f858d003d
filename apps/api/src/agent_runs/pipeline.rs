//! Pipeline runner: state machine around one pipeline stage (match, shortlist, outreach, ...).
//!
//! running → success | failed | skipped. The `agent_runs` row is created in `running`
//! and receives exactly one terminal update; all terminal updates stamp `finished_at`.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent_runs::{AgentRunStore, NewAgentRun};
use crate::errors::AppError;
use crate::models::agent_run::PipelineRunStatus;
use crate::models::tenant::SystemMode;

#[derive(Debug, Clone)]
pub struct PipelineStepOptions {
    pub agent_name: String,
    pub tenant_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub mode: SystemMode,
    pub prompt_meta: Option<Value>,
    pub input: Value,
    /// When set the step is recorded as skipped and the handler never runs.
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachInteraction {
    pub candidate_id: Uuid,
    pub channel: String,
}

/// What a stage handler hands back to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome<T> {
    pub results: T,
    pub counts: BTreeMap<String, i64>,
    pub outreach_interactions: Vec<OutreachInteraction>,
    pub token_usage: Option<TokenUsage>,
}

impl<T> StepOutcome<T> {
    pub fn new(results: T) -> Self {
        Self {
            results,
            counts: BTreeMap::new(),
            outreach_interactions: Vec::new(),
            token_usage: None,
        }
    }

    pub fn with_count(mut self, key: &str, value: i64) -> Self {
        self.counts.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSuccessOutput {
    pub results: Value,
    pub counts: BTreeMap<String, i64>,
    pub outreach_interactions: Vec<OutreachInteraction>,
    pub mode: SystemMode,
    pub tenant_id: Uuid,
    pub token_usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailureOutput {
    pub error: String,
    pub stack: Option<String>,
    pub mode: SystemMode,
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSkipOutput {
    pub reason: String,
    pub mode: SystemMode,
    pub tenant_id: Uuid,
}

/// Payload stored in `agent_runs.output`, tagged by terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineOutput {
    Success(PipelineSuccessOutput),
    Failure(PipelineFailureOutput),
    Skipped(PipelineSkipOutput),
}

impl PipelineOutput {
    pub fn status(&self) -> PipelineRunStatus {
        match self {
            PipelineOutput::Success(_) => PipelineRunStatus::Success,
            PipelineOutput::Failure(_) => PipelineRunStatus::Failed,
            PipelineOutput::Skipped(_) => PipelineRunStatus::Skipped,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineStepResult<T> {
    Success { run_id: Uuid, outcome: StepOutcome<T> },
    Skipped { run_id: Uuid, reason: String },
}

pub async fn run_pipeline_step<T, F, Fut>(
    runs: &dyn AgentRunStore,
    options: PipelineStepOptions,
    handler: F,
) -> Result<PipelineStepResult<T>, AppError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<StepOutcome<T>, AppError>>,
{
    let run = runs
        .create_pipeline_run(NewAgentRun {
            agent_name: options.agent_name.clone(),
            tenant_id: options.tenant_id,
            requested_by: options.requested_by,
            job_id: options.job_id,
            mode: options.mode.as_str().to_string(),
            prompt_meta: options.prompt_meta.clone(),
            input: normalize_snapshot(options.input.clone()),
            started_at: Utc::now(),
        })
        .await?;

    if let Some(reason) = options.skip_reason.clone() {
        let output = PipelineOutput::Skipped(PipelineSkipOutput {
            reason: reason.clone(),
            mode: options.mode,
            tenant_id: options.tenant_id,
        });
        finish(runs, run.id, &output).await?;
        info!(run_id = %run.id, agent = %options.agent_name, %reason, "Pipeline step skipped");
        return Ok(PipelineStepResult::Skipped {
            run_id: run.id,
            reason,
        });
    }

    match handler().await {
        Ok(outcome) => {
            let results = serde_json::to_value(&outcome.results).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to serialize step results: {e}"))
            })?;
            let output = PipelineOutput::Success(PipelineSuccessOutput {
                results,
                counts: outcome.counts.clone(),
                outreach_interactions: outcome.outreach_interactions.clone(),
                mode: options.mode,
                tenant_id: options.tenant_id,
                token_usage: outcome.token_usage.clone(),
            });
            finish(runs, run.id, &output).await?;
            info!(run_id = %run.id, agent = %options.agent_name, "Pipeline step succeeded");
            Ok(PipelineStepResult::Success {
                run_id: run.id,
                outcome,
            })
        }
        Err(err) => {
            let output = PipelineOutput::Failure(PipelineFailureOutput {
                error: err.to_string(),
                stack: Some(format!("{err:?}")),
                mode: options.mode,
                tenant_id: options.tenant_id,
            });
            if let Err(log_err) = finish(runs, run.id, &output).await {
                error!(run_id = %run.id, error = %log_err, "Failed to record pipeline failure");
            }
            warn!(run_id = %run.id, agent = %options.agent_name, error = %err, "Pipeline step failed");
            Err(err)
        }
    }
}

async fn finish(runs: &dyn AgentRunStore, run_id: Uuid, output: &PipelineOutput) -> Result<(), AppError> {
    let value = serde_json::to_value(output)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize pipeline output: {e}")))?;
    runs.finish_pipeline_run(run_id, output.status(), value, Utc::now())
        .await
}

/// Drops `null` members recursively so equivalent inputs snapshot identically.
pub fn normalize_snapshot(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, normalize_snapshot(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_snapshot).collect()),
        other => other,
    }
}
