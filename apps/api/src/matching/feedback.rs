//! Recruiter feedback on a match.
//!
//! One current row per (tenant, job, candidate, user); re-submissions overwrite it.
//! Each row snapshots the match signals, a hash of the guardrails in force, the
//! tenant's system mode and the confidence band so the verdict can be replayed later.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::guards::Guards;
use crate::models::matching::{MatchFeedbackRow, MatchResultRow};
use crate::models::tenant::{Guardrails, SystemMode};
use crate::store::PgStore;

const LOW_BAND_BELOW: i32 = 45;
const HIGH_BAND_FROM: i32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackVerdict {
    Positive,
    Negative,
    Neutral,
}

impl FeedbackVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackVerdict::Positive => "positive",
            FeedbackVerdict::Negative => "negative",
            FeedbackVerdict::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
    /// No match result to read a signal score from.
    Unknown,
}

impl ConfidenceBand {
    pub fn from_score(score: i32) -> Self {
        if score < LOW_BAND_BELOW {
            ConfidenceBand::Low
        } else if score >= HIGH_BAND_FROM {
            ConfidenceBand::High
        } else {
            ConfidenceBand::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
            ConfidenceBand::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchFeedbackInput {
    pub tenant_id: Uuid,
    pub job_req_id: Uuid,
    pub candidate_id: Uuid,
    pub user_id: Uuid,
    pub feedback: FeedbackVerdict,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewMatchFeedback {
    pub tenant_id: Uuid,
    pub job_req_id: Uuid,
    pub candidate_id: Uuid,
    pub user_id: Uuid,
    pub match_result_id: Option<Uuid>,
    pub feedback: FeedbackVerdict,
    pub notes: Option<String>,
    pub signal_snapshot: Value,
    pub guardrails_hash: String,
    pub system_mode: SystemMode,
    pub confidence_band: ConfidenceBand,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Recorded { feedback: MatchFeedbackRow },
    Suppressed { system_mode: SystemMode },
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn latest_match_for(
        &self,
        tenant_id: Uuid,
        job_req_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<MatchResultRow>, AppError>;

    /// Upsert on (tenant_id, job_req_id, candidate_id, user_id); last writer wins.
    async fn upsert_feedback(&self, new: NewMatchFeedback) -> Result<MatchFeedbackRow, AppError>;
}

/// Hex SHA-256 of the guardrails' canonical JSON form.
pub fn guardrails_hash(guardrails: &Guardrails) -> Result<String, AppError> {
    let bytes = serde_json::to_vec(guardrails)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize guardrails: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn signal_snapshot(m: &MatchResultRow) -> Value {
    json!({
        "match_result_id": m.id,
        "score": m.score,
        "skill_score": m.skill_score,
        "seniority_score": m.seniority_score,
        "location_score": m.location_score,
        "candidate_signal_score": m.candidate_signal_score,
        "confidence_score": m.candidate_signal_breakdown.0.confidence.score,
        "shortlisted": m.shortlisted,
        "matched_at": m.created_at,
    })
}

pub async fn record_match_feedback(
    store: &dyn FeedbackStore,
    guards: &dyn Guards,
    input: MatchFeedbackInput,
    now: DateTime<Utc>,
) -> Result<FeedbackOutcome, AppError> {
    let tenant = guards.tenant_config(input.tenant_id).await?;
    let mode = tenant.mode();
    if mode.suppresses_learning() {
        info!(tenant_id = %input.tenant_id, system_mode = %mode, "Match feedback suppressed");
        return Ok(FeedbackOutcome::Suppressed { system_mode: mode });
    }

    let latest = store
        .latest_match_for(input.tenant_id, input.job_req_id, input.candidate_id)
        .await?;

    let (match_result_id, snapshot, band) = match &latest {
        Some(m) => (
            Some(m.id),
            signal_snapshot(m),
            ConfidenceBand::from_score(m.candidate_signal_score),
        ),
        None => (None, Value::Null, ConfidenceBand::Unknown),
    };

    let feedback = store
        .upsert_feedback(NewMatchFeedback {
            tenant_id: input.tenant_id,
            job_req_id: input.job_req_id,
            candidate_id: input.candidate_id,
            user_id: input.user_id,
            match_result_id,
            feedback: input.feedback,
            notes: input.notes,
            signal_snapshot: snapshot,
            guardrails_hash: guardrails_hash(&tenant.guardrails.0)?,
            system_mode: mode,
            confidence_band: band,
            recorded_at: now,
        })
        .await?;

    info!(
        tenant_id = %feedback.tenant_id,
        job_req_id = %feedback.job_req_id,
        candidate_id = %feedback.candidate_id,
        verdict = %feedback.feedback,
        confidence_band = %band,
        "Match feedback recorded"
    );
    Ok(FeedbackOutcome::Recorded { feedback })
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl FeedbackStore for PgStore {
    async fn latest_match_for(
        &self,
        tenant_id: Uuid,
        job_req_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<MatchResultRow>, AppError> {
        Ok(sqlx::query_as::<_, MatchResultRow>(
            r#"
            SELECT * FROM match_results
            WHERE tenant_id = $1 AND job_req_id = $2 AND candidate_id = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(job_req_id)
        .bind(candidate_id)
        .fetch_optional(self.pool())
        .await?)
    }

    async fn upsert_feedback(&self, new: NewMatchFeedback) -> Result<MatchFeedbackRow, AppError> {
        Ok(sqlx::query_as::<_, MatchFeedbackRow>(
            r#"
            INSERT INTO match_feedback
                (id, tenant_id, job_req_id, candidate_id, user_id, match_result_id, feedback, notes,
                 signal_snapshot, guardrails_hash, system_mode, confidence_band, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            ON CONFLICT (tenant_id, job_req_id, candidate_id, user_id) DO UPDATE
            SET match_result_id = EXCLUDED.match_result_id,
                feedback = EXCLUDED.feedback,
                notes = EXCLUDED.notes,
                signal_snapshot = EXCLUDED.signal_snapshot,
                guardrails_hash = EXCLUDED.guardrails_hash,
                system_mode = EXCLUDED.system_mode,
                confidence_band = EXCLUDED.confidence_band,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(new.job_req_id)
        .bind(new.candidate_id)
        .bind(new.user_id)
        .bind(new.match_result_id)
        .bind(new.feedback.as_str())
        .bind(&new.notes)
        .bind(&new.signal_snapshot)
        .bind(&new.guardrails_hash)
        .bind(new.system_mode.as_str())
        .bind(new.confidence_band.as_str())
        .bind(new.recorded_at)
        .fetch_one(self.pool())
        .await?)
    }
}
