use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::scoring::match_score::MatchReasons;
use crate::scoring::signals::CandidateSignalBreakdown;

/// One scored (candidate, job) pair from one matcher run. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchResultRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_req_id: Uuid,
    pub candidate_id: Uuid,
    pub score: i32,
    pub skill_score: i32,
    pub seniority_score: i32,
    pub location_score: i32,
    pub candidate_signal_score: i32,
    pub candidate_signal_breakdown: Json<CandidateSignalBreakdown>,
    pub shortlisted: bool,
    pub shortlist_reason: Option<String>,
    pub reasons: Json<MatchReasons>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchFeedbackRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_req_id: Uuid,
    pub candidate_id: Uuid,
    pub user_id: Uuid,
    pub match_result_id: Option<Uuid>,
    pub feedback: String,
    pub notes: Option<String>,
    pub signal_snapshot: Value,
    pub guardrails_hash: String,
    pub system_mode: String,
    pub confidence_band: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
