//! Agent run bookkeeping.
//!
//! Two append-only tables:
//! - `agent_run_logs`: one row per agent invocation (matcher, cron jobs), RUNNING → SUCCESS | FAILED
//! - `agent_runs`: one row per pipeline step, running → success | failed | skipped
//!
//! Each row receives exactly one terminal write. The Postgres updates are guarded on the
//! non-terminal status so a second terminal write is a no-op.

pub mod handlers;
pub mod pipeline;

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::agent_run::{AgentRunLogRow, AgentRunLogStatus, AgentRunRow, PipelineRunStatus};
use crate::store::PgStore;

#[derive(Debug, Clone)]
pub struct NewAgentRunLog {
    pub agent_name: String,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub input: Value,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AgentRunLogUpdate {
    pub status: AgentRunLogStatus,
    pub output: Option<Value>,
    pub error_message: Option<String>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone)]
pub struct NewAgentRun {
    pub agent_name: String,
    pub tenant_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub mode: String,
    pub prompt_meta: Option<Value>,
    pub input: Value,
    pub started_at: DateTime<Utc>,
}

#[async_trait]
pub trait AgentRunStore: Send + Sync {
    async fn create_run_log(&self, new: NewAgentRunLog) -> Result<AgentRunLogRow, AppError>;

    async fn finish_run_log(&self, id: Uuid, update: AgentRunLogUpdate) -> Result<(), AppError>;

    async fn create_pipeline_run(&self, new: NewAgentRun) -> Result<AgentRunRow, AppError>;

    async fn finish_pipeline_run(
        &self,
        id: Uuid,
        status: PipelineRunStatus,
        output: Value,
        finished_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

/// Attribution for an `agent_run_logs` row.
#[derive(Debug, Clone)]
pub struct AgentRunLogParams {
    pub agent_name: String,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub input: Value,
}

/// Runs `body` wrapped in an `agent_run_logs` row.
///
/// The row is created RUNNING before `body` starts, so precondition failures raised inside
/// `body` are still recorded. On error the row is marked FAILED with the message and the
/// original error is returned to the caller.
pub async fn with_agent_run_log<T, F, Fut>(
    runs: &dyn AgentRunStore,
    params: AgentRunLogParams,
    body: F,
) -> Result<T, AppError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let agent_name = params.agent_name.clone();
    let log = runs
        .create_run_log(NewAgentRunLog {
            agent_name: params.agent_name,
            tenant_id: params.tenant_id,
            user_id: params.user_id,
            input: params.input,
            started_at: Utc::now(),
        })
        .await?;
    let started = Instant::now();

    match body().await {
        Ok(output) => {
            let duration_ms = started.elapsed().as_millis() as i64;
            let snapshot = serde_json::to_value(&output)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize run output: {e}")))?;
            runs.finish_run_log(
                log.id,
                AgentRunLogUpdate {
                    status: AgentRunLogStatus::Success,
                    output: Some(snapshot),
                    error_message: None,
                    finished_at: Utc::now(),
                    duration_ms,
                },
            )
            .await?;
            info!(run_id = %log.id, agent = %agent_name, duration_ms, "Agent run succeeded");
            Ok(output)
        }
        Err(err) => {
            let duration_ms = started.elapsed().as_millis() as i64;
            warn!(run_id = %log.id, agent = %agent_name, duration_ms, error = %err, "Agent run failed");
            if let Err(log_err) = runs
                .finish_run_log(
                    log.id,
                    AgentRunLogUpdate {
                        status: AgentRunLogStatus::Failed,
                        output: None,
                        error_message: Some(err.to_string()),
                        finished_at: Utc::now(),
                        duration_ms,
                    },
                )
                .await
            {
                error!(run_id = %log.id, error = %log_err, "Failed to record agent run failure");
            }
            Err(err)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AgentRunStore for PgStore {
    async fn create_run_log(&self, new: NewAgentRunLog) -> Result<AgentRunLogRow, AppError> {
        Ok(sqlx::query_as::<_, AgentRunLogRow>(
            r#"
            INSERT INTO agent_run_logs (id, tenant_id, user_id, agent_name, status, input, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(new.user_id)
        .bind(&new.agent_name)
        .bind(AgentRunLogStatus::Running.as_str())
        .bind(&new.input)
        .bind(new.started_at)
        .fetch_one(self.pool())
        .await?)
    }

    async fn finish_run_log(&self, id: Uuid, update: AgentRunLogUpdate) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE agent_run_logs
            SET status = $2, output = $3, error_message = $4, finished_at = $5, duration_ms = $6
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(&update.output)
        .bind(&update.error_message)
        .bind(update.finished_at)
        .bind(update.duration_ms)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn create_pipeline_run(&self, new: NewAgentRun) -> Result<AgentRunRow, AppError> {
        Ok(sqlx::query_as::<_, AgentRunRow>(
            r#"
            INSERT INTO agent_runs
                (id, agent_name, tenant_id, requested_by, job_id, mode, prompt_meta, input, status, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.agent_name)
        .bind(new.tenant_id)
        .bind(new.requested_by)
        .bind(new.job_id)
        .bind(&new.mode)
        .bind(&new.prompt_meta)
        .bind(&new.input)
        .bind(PipelineRunStatus::Running.as_str())
        .bind(new.started_at)
        .fetch_one(self.pool())
        .await?)
    }

    async fn finish_pipeline_run(
        &self,
        id: Uuid,
        status: PipelineRunStatus,
        output: Value,
        finished_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE agent_runs
            SET status = $2, output = $3, finished_at = $4
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&output)
        .bind(finished_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
