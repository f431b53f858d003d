use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobReqRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub seniority: Option<String>,
    pub raw_description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobSkillRow {
    pub id: Uuid,
    pub job_req_id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub required: bool,
    pub weight: Option<f64>,
}

/// A job requisition together with its skills, as loaded for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReq {
    #[serde(flatten)]
    pub req: JobReqRow,
    pub skills: Vec<JobSkillRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: String,
    pub entered_at: DateTime<Utc>,
}

/// Pipeline link between a job and a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobCandidateRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_req_id: Uuid,
    pub candidate_id: Uuid,
    pub status: String,
    pub stages: Json<Vec<StageEntry>>,
    pub last_match_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
