use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub current_title: Option<String>,
    pub location: Option<String>,
    pub seniority: Option<String>,
    pub years_experience: Option<f64>,
    pub summary: Option<String>,
    pub raw_resume: Option<String>,
    pub source_type: Option<String>,
    pub source_tag: Option<String>,
    /// 0.0 – 1.0, written by the profile agent when it parses a resume.
    pub parsing_confidence: Option<f64>,
    /// 0 – 100, last persisted candidate confidence score.
    pub trust_score: Option<f64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateSkillRow {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub proficiency: Option<String>,
    pub years: Option<f64>,
}

/// A candidate together with its skills, as loaded for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub profile: CandidateRow,
    pub skills: Vec<CandidateSkillRow>,
}

/// Outreach engagement counters for one candidate, aggregated from outreach interactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EngagementRow {
    pub candidate_id: Uuid,
    pub interactions: i64,
    pub replies: i64,
    pub last_interaction_at: Option<DateTime<Utc>>,
}
