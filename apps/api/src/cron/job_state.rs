//! Persisted per-job state for scheduled jobs.
//!
//! Status moves idle → running → success | failed. Retries are zeroed on success and
//! incremented (capped at `MAX_RETRIES`) on failure; every failure schedules
//! `next_run_at = now + backoff(retries)`, and a job is not run again before then.
//! Once capped, the job keeps retrying at the maximum delay.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::errors::AppError;
use crate::models::job_state::{AsyncJobStateRow, JobStatus};
use crate::store::PgStore;

pub const MAX_RETRIES: i32 = 5;

const BASE_DELAY_MS: i64 = 60_000;
const MAX_DELAY_MS: i64 = 3_600_000;

/// `min(60s * 2^(retries-1), 1h)`, with `retries` clamped to at least 1.
pub fn compute_backoff_delay_ms(retries: i32) -> i64 {
    let exponent = (retries.max(1) - 1).min(32) as u32;
    BASE_DELAY_MS
        .saturating_mul(2i64.saturating_pow(exponent))
        .min(MAX_DELAY_MS)
}

pub fn is_in_backoff(state: &AsyncJobStateRow, now: DateTime<Utc>) -> bool {
    state.next_run_at.map(|next| next > now).unwrap_or(false)
}

#[async_trait]
pub trait JobStateStore: Send + Sync {
    async fn find_job_state(&self, job_name: &str) -> Result<Option<AsyncJobStateRow>, AppError>;

    /// Inserts an idle row unless one exists, then returns the stored row.
    async fn create_job_state_if_absent(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
    ) -> Result<AsyncJobStateRow, AppError>;

    async fn save_job_state(&self, state: &AsyncJobStateRow) -> Result<AsyncJobStateRow, AppError>;
}

pub async fn ensure_job_state(
    store: &dyn JobStateStore,
    job_name: &str,
    now: DateTime<Utc>,
) -> Result<AsyncJobStateRow, AppError> {
    match store.find_job_state(job_name).await? {
        Some(state) => Ok(state),
        None => store.create_job_state_if_absent(job_name, now).await,
    }
}

pub async fn mark_job_started(
    store: &dyn JobStateStore,
    job_name: &str,
    now: DateTime<Utc>,
) -> Result<AsyncJobStateRow, AppError> {
    let mut state = ensure_job_state(store, job_name, now).await?;
    state.status = JobStatus::Running.as_str().to_string();
    state.last_error = None;
    state.next_run_at = None;
    state.last_run_at = Some(now);
    state.updated_at = now;
    store.save_job_state(&state).await
}

pub async fn mark_job_success(
    store: &dyn JobStateStore,
    job_name: &str,
    now: DateTime<Utc>,
) -> Result<AsyncJobStateRow, AppError> {
    let mut state = ensure_job_state(store, job_name, now).await?;
    state.status = JobStatus::Success.as_str().to_string();
    state.retries = 0;
    state.last_error = None;
    state.next_run_at = None;
    state.updated_at = now;
    store.save_job_state(&state).await
}

pub async fn mark_job_failure(
    store: &dyn JobStateStore,
    job_name: &str,
    error: &str,
    now: DateTime<Utc>,
) -> Result<AsyncJobStateRow, AppError> {
    let mut state = ensure_job_state(store, job_name, now).await?;
    let retries = (state.retries + 1).min(MAX_RETRIES);
    state.status = JobStatus::Failed.as_str().to_string();
    state.retries = retries;
    state.last_error = Some(error.to_string());
    state.next_run_at = Some(now + Duration::milliseconds(compute_backoff_delay_ms(retries)));
    state.updated_at = now;
    store.save_job_state(&state).await
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl JobStateStore for PgStore {
    async fn find_job_state(&self, job_name: &str) -> Result<Option<AsyncJobStateRow>, AppError> {
        Ok(
            sqlx::query_as::<_, AsyncJobStateRow>("SELECT * FROM async_job_states WHERE job_name = $1")
                .bind(job_name)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    async fn create_job_state_if_absent(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
    ) -> Result<AsyncJobStateRow, AppError> {
        sqlx::query(
            r#"
            INSERT INTO async_job_states (job_name, status, retries, updated_at)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (job_name) DO NOTHING
            "#,
        )
        .bind(job_name)
        .bind(JobStatus::Idle.as_str())
        .bind(now)
        .execute(self.pool())
        .await?;

        self.find_job_state(job_name)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Job state for {job_name} vanished after insert")))
    }

    async fn save_job_state(&self, state: &AsyncJobStateRow) -> Result<AsyncJobStateRow, AppError> {
        Ok(sqlx::query_as::<_, AsyncJobStateRow>(
            r#"
            INSERT INTO async_job_states (job_name, status, retries, last_error, last_run_at, next_run_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (job_name) DO UPDATE
            SET status = EXCLUDED.status,
                retries = EXCLUDED.retries,
                last_error = EXCLUDED.last_error,
                last_run_at = EXCLUDED.last_run_at,
                next_run_at = EXCLUDED.next_run_at,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(&state.job_name)
        .bind(&state.status)
        .bind(state.retries)
        .bind(&state.last_error)
        .bind(state.last_run_at)
        .bind(state.next_run_at)
        .bind(state.updated_at)
        .fetch_one(self.pool())
        .await?)
    }
}
