//! Cron runner: backoff gate, job-state transitions and run logging around a job body.
//!
//! Callers must not invoke the same job concurrently. The backoff check and
//! `mark_job_started` are not atomic; the scheduler is the single invoker.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent_runs::{with_agent_run_log, AgentRunLogParams, AgentRunStore};
use crate::cron::job_state::{
    ensure_job_state, is_in_backoff, mark_job_failure, mark_job_started, mark_job_success, JobStateStore,
};
use crate::errors::AppError;
use crate::models::job_state::AsyncJobStateRow;
use crate::store::PgStore;

#[async_trait]
pub trait CronJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, now: DateTime<Utc>) -> Result<Value, AppError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_audit(&self, event: AuditEvent) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CronRunOutcome {
    Skipped {
        job_name: String,
        next_run_at: Option<DateTime<Utc>>,
    },
    Success {
        job_name: String,
        output: Value,
        state: AsyncJobStateRow,
    },
}

/// A failed cron run together with the job state the failure left behind.
#[derive(Debug, thiserror::Error)]
#[error("Cron job {job_name} failed: {source}")]
pub struct CronJobError {
    pub job_name: String,
    #[source]
    pub source: AppError,
    pub state: Option<AsyncJobStateRow>,
}

impl IntoResponse for CronJobError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.source.code(),
                "message": self.source.public_message(),
            },
            "job_name": self.job_name,
            "job_state": self.state,
        }));
        (self.source.status(), body).into_response()
    }
}

/// True for jobs whose successful runs must leave a retention audit trail.
pub fn is_retention_job(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("retention") || lower.contains("deletion")
}

pub struct CronRunner {
    job_states: Arc<dyn JobStateStore>,
    runs: Arc<dyn AgentRunStore>,
    audit: Arc<dyn AuditSink>,
    jobs: BTreeMap<&'static str, Arc<dyn CronJob>>,
}

impl CronRunner {
    pub fn new(
        job_states: Arc<dyn JobStateStore>,
        runs: Arc<dyn AgentRunStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            job_states,
            runs,
            audit,
            jobs: BTreeMap::new(),
        }
    }

    pub fn register(mut self, job: Arc<dyn CronJob>) -> Self {
        self.jobs.insert(job.name(), job);
        self
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.keys().copied().collect()
    }

    pub fn has_job(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub async fn run_cron_job(&self, job_name: &str) -> Result<CronRunOutcome, CronJobError> {
        self.run_cron_job_at(job_name, Utc::now()).await
    }

    pub async fn run_cron_job_at(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
    ) -> Result<CronRunOutcome, CronJobError> {
        let fail = |source: AppError, state: Option<AsyncJobStateRow>| CronJobError {
            job_name: job_name.to_string(),
            source,
            state,
        };

        let job = self
            .jobs
            .get(job_name)
            .cloned()
            .ok_or_else(|| fail(AppError::NotFound(format!("Unknown cron job '{job_name}'")), None))?;

        let store = self.job_states.as_ref();
        let current = ensure_job_state(store, job_name, now)
            .await
            .map_err(|e| fail(e, None))?;

        if is_in_backoff(&current, now) {
            info!(job = %job_name, next_run_at = ?current.next_run_at, "Cron job in backoff, skipping");
            return Ok(CronRunOutcome::Skipped {
                job_name: job_name.to_string(),
                next_run_at: current.next_run_at,
            });
        }

        mark_job_started(store, job_name, now)
            .await
            .map_err(|e| fail(e, Some(current.clone())))?;

        let params = AgentRunLogParams {
            agent_name: format!("CRON:{job_name}"),
            tenant_id: None,
            user_id: None,
            input: json!({ "job_name": job_name, "triggered_at": now }),
        };
        let result = with_agent_run_log(self.runs.as_ref(), params, || job.run(now)).await;

        match result {
            Ok(output) => {
                let state = match mark_job_success(store, job_name, now).await {
                    Ok(state) => state,
                    Err(state_err) => {
                        error!(job = %job_name, error = %state_err, "Failed to record cron success");
                        // never leave the row in `running`
                        let message = format!("Job finished but its success was not recorded: {state_err}");
                        let state = match mark_job_failure(store, job_name, &message, now).await {
                            Ok(state) => Some(state),
                            Err(e) => {
                                error!(job = %job_name, error = %e, "Failed to record cron failure");
                                None
                            }
                        };
                        return Err(fail(state_err, state));
                    }
                };

                if is_retention_job(job_name) {
                    self.emit_retention_audit(job_name, &output).await;
                }

                info!(job = %job_name, "Cron job succeeded");
                Ok(CronRunOutcome::Success {
                    job_name: job_name.to_string(),
                    output,
                    state,
                })
            }
            Err(err) => {
                let state = match mark_job_failure(store, job_name, &err.to_string(), now).await {
                    Ok(state) => Some(state),
                    Err(state_err) => {
                        error!(job = %job_name, error = %state_err, "Failed to record cron failure");
                        None
                    }
                };
                warn!(
                    job = %job_name,
                    retries = state.as_ref().map(|s| s.retries),
                    next_run_at = ?state.as_ref().and_then(|s| s.next_run_at),
                    error = %err,
                    "Cron job failed"
                );
                Err(fail(err, state))
            }
        }
    }

    async fn emit_retention_audit(&self, job_name: &str, output: &Value) {
        let event = AuditEvent {
            action: "retention.job.completed".to_string(),
            entity_type: "cron_job".to_string(),
            entity_id: Some(job_name.to_string()),
            tenant_id: None,
            metadata: output.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.audit.record_audit(event).await {
            warn!(job = %job_name, error = %e, "Failed to record retention audit event");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AuditSink for PgStore {
    async fn record_audit(&self, event: AuditEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, tenant_id, action, entity_type, entity_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.tenant_id)
        .bind(&event.action)
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
