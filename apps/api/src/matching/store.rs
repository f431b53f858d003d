//! Persistence seams for matching: reads through `MatchStore`, writes through a
//! transactional unit of work so the match result and its pipeline link land together.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::{Candidate, CandidateRow, CandidateSkillRow, EngagementRow};
use crate::models::job::{JobCandidateRow, JobReq, JobReqRow, JobSkillRow, StageEntry};
use crate::models::matching::MatchResultRow;
use crate::scoring::match_score::MatchScore;
use crate::store::PgStore;

/// Stage a candidate enters when first linked to a job by the matcher.
pub const MATCHED_STAGE: &str = "matched";

#[derive(Debug, Clone)]
pub struct NewMatchResult {
    pub tenant_id: Uuid,
    pub job_req_id: Uuid,
    pub candidate_id: Uuid,
    pub score: MatchScore,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JobCandidateLink {
    pub tenant_id: Uuid,
    pub job_req_id: Uuid,
    pub candidate_id: Uuid,
    pub match_id: Uuid,
    pub touched_at: DateTime<Utc>,
}

/// Writes available inside one transaction.
#[async_trait]
pub trait MatchTransaction: Send {
    async fn create_match_result(&mut self, new: NewMatchResult) -> Result<MatchResultRow, AppError>;

    /// Creates the link if absent, otherwise points it at the new match.
    async fn upsert_job_candidate(&mut self, link: JobCandidateLink) -> Result<JobCandidateRow, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn MatchTransaction>, AppError>;
}

/// Runs `work` inside a transaction: commit on `Ok`, roll back on `Err`.
pub async fn with_transaction<U, T, F>(uow: &U, work: F) -> Result<T, AppError>
where
    U: UnitOfWork + ?Sized,
    F: for<'t> FnOnce(&'t mut dyn MatchTransaction) -> BoxFuture<'t, Result<T, AppError>>,
{
    let mut tx = uow.begin().await?;
    match work(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

#[async_trait]
pub trait MatchStore: UnitOfWork {
    async fn load_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Option<JobReq>, AppError>;

    /// Non-deleted candidates of the tenant, in a stable database order.
    async fn load_active_candidates(&self, tenant_id: Uuid) -> Result<Vec<Candidate>, AppError>;

    async fn load_candidate(&self, tenant_id: Uuid, candidate_id: Uuid) -> Result<Option<Candidate>, AppError>;

    async fn load_engagement(
        &self,
        tenant_id: Uuid,
        candidate_ids: &[Uuid],
    ) -> Result<Vec<EngagementRow>, AppError>;

    /// Most recent match result per candidate for the job.
    async fn latest_matches_for_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Vec<MatchResultRow>, AppError>;

    async fn mark_shortlisted(&self, match_id: Uuid, reason: &str) -> Result<(), AppError>;

    async fn update_trust_score(&self, tenant_id: Uuid, candidate_id: Uuid, score: f64) -> Result<(), AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

pub struct PgMatchTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MatchTransaction for PgMatchTransaction {
    async fn create_match_result(&mut self, new: NewMatchResult) -> Result<MatchResultRow, AppError> {
        let score = new.score;
        Ok(sqlx::query_as::<_, MatchResultRow>(
            r#"
            INSERT INTO match_results
                (id, tenant_id, job_req_id, candidate_id, score, skill_score, seniority_score,
                 location_score, candidate_signal_score, candidate_signal_breakdown,
                 shortlisted, shortlist_reason, reasons, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, NULL, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(new.job_req_id)
        .bind(new.candidate_id)
        .bind(score.score)
        .bind(score.skill_score)
        .bind(score.seniority_score)
        .bind(score.location_score)
        .bind(score.candidate_signal_score)
        .bind(Json(&score.candidate_signal_breakdown))
        .bind(Json(&score.reasons))
        .bind(new.created_at)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn upsert_job_candidate(&mut self, link: JobCandidateLink) -> Result<JobCandidateRow, AppError> {
        let stages = vec![StageEntry {
            stage: MATCHED_STAGE.to_string(),
            entered_at: link.touched_at,
        }];
        Ok(sqlx::query_as::<_, JobCandidateRow>(
            r#"
            INSERT INTO job_candidates
                (id, tenant_id, job_req_id, candidate_id, status, stages, last_match_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT (tenant_id, job_req_id, candidate_id) DO UPDATE
            SET last_match_id = EXCLUDED.last_match_id, updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(link.tenant_id)
        .bind(link.job_req_id)
        .bind(link.candidate_id)
        .bind(MATCHED_STAGE)
        .bind(Json(stages))
        .bind(link.match_id)
        .bind(link.touched_at)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgStore {
    async fn begin(&self) -> Result<Box<dyn MatchTransaction>, AppError> {
        let tx = self.pool().begin().await?;
        Ok(Box::new(PgMatchTransaction { tx }))
    }
}

impl PgStore {
    async fn load_candidate_skills(
        &self,
        candidate_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<CandidateSkillRow>>, AppError> {
        let rows = sqlx::query_as::<_, CandidateSkillRow>(
            "SELECT * FROM candidate_skills WHERE candidate_id = ANY($1) ORDER BY name",
        )
        .bind(candidate_ids)
        .fetch_all(self.pool())
        .await?;

        let mut by_candidate: HashMap<Uuid, Vec<CandidateSkillRow>> = HashMap::new();
        for row in rows {
            by_candidate.entry(row.candidate_id).or_default().push(row);
        }
        Ok(by_candidate)
    }
}

#[async_trait]
impl MatchStore for PgStore {
    async fn load_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Option<JobReq>, AppError> {
        let req = sqlx::query_as::<_, JobReqRow>("SELECT * FROM job_reqs WHERE id = $1 AND tenant_id = $2")
            .bind(job_id)
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?;

        let Some(req) = req else {
            return Ok(None);
        };

        let skills = sqlx::query_as::<_, JobSkillRow>(
            "SELECT * FROM job_skills WHERE job_req_id = $1 ORDER BY required DESC, name",
        )
        .bind(job_id)
        .fetch_all(self.pool())
        .await?;

        Ok(Some(JobReq { req, skills }))
    }

    async fn load_active_candidates(&self, tenant_id: Uuid) -> Result<Vec<Candidate>, AppError> {
        let profiles = sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT * FROM candidates
            WHERE tenant_id = $1 AND deleted_at IS NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        let ids: Vec<Uuid> = profiles.iter().map(|p| p.id).collect();
        let mut skills = self.load_candidate_skills(&ids).await?;

        Ok(profiles
            .into_iter()
            .map(|profile| Candidate {
                skills: skills.remove(&profile.id).unwrap_or_default(),
                profile,
            })
            .collect())
    }

    async fn load_candidate(&self, tenant_id: Uuid, candidate_id: Uuid) -> Result<Option<Candidate>, AppError> {
        let profile = sqlx::query_as::<_, CandidateRow>(
            "SELECT * FROM candidates WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(candidate_id)
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(profile) = profile else {
            return Ok(None);
        };
        let mut skills = self.load_candidate_skills(&[candidate_id]).await?;

        Ok(Some(Candidate {
            skills: skills.remove(&candidate_id).unwrap_or_default(),
            profile,
        }))
    }

    async fn load_engagement(
        &self,
        tenant_id: Uuid,
        candidate_ids: &[Uuid],
    ) -> Result<Vec<EngagementRow>, AppError> {
        Ok(sqlx::query_as::<_, EngagementRow>(
            r#"
            SELECT candidate_id,
                   COUNT(*)::BIGINT AS interactions,
                   COUNT(*) FILTER (WHERE replied)::BIGINT AS replies,
                   MAX(created_at) AS last_interaction_at
            FROM outreach_interactions
            WHERE tenant_id = $1 AND candidate_id = ANY($2)
            GROUP BY candidate_id
            "#,
        )
        .bind(tenant_id)
        .bind(candidate_ids)
        .fetch_all(self.pool())
        .await?)
    }

    async fn latest_matches_for_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Vec<MatchResultRow>, AppError> {
        Ok(sqlx::query_as::<_, MatchResultRow>(
            r#"
            SELECT DISTINCT ON (candidate_id) *
            FROM match_results
            WHERE tenant_id = $1 AND job_req_id = $2
            ORDER BY candidate_id, created_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(job_id)
        .fetch_all(self.pool())
        .await?)
    }

    async fn mark_shortlisted(&self, match_id: Uuid, reason: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE match_results SET shortlisted = TRUE, shortlist_reason = $2 WHERE id = $1")
            .bind(match_id)
            .bind(reason)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn update_trust_score(&self, tenant_id: Uuid, candidate_id: Uuid, score: f64) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE candidates SET trust_score = $3 WHERE id = $1 AND tenant_id = $2")
            .bind(candidate_id)
            .bind(tenant_id)
            .bind(score)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Candidate {candidate_id} not found")));
        }
        Ok(())
    }
}
