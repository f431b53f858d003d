use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Status of an `agent_run_logs` row. Stored upper-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentRunLogStatus {
    Running,
    Success,
    Failed,
}

impl AgentRunLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRunLogStatus::Running => "RUNNING",
            AgentRunLogStatus::Success => "SUCCESS",
            AgentRunLogStatus::Failed => "FAILED",
        }
    }
}

/// Status of an `agent_runs` (pipeline step) row. Stored lower-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRunStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl PipelineRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineRunStatus::Running => "running",
            PipelineRunStatus::Success => "success",
            PipelineRunStatus::Failed => "failed",
            PipelineRunStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentRunLogRow {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub agent_name: String,
    pub status: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentRunRow {
    pub id: Uuid,
    pub agent_name: String,
    pub tenant_id: Uuid,
    pub requested_by: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub mode: String,
    pub prompt_meta: Option<Value>,
    pub input: Value,
    pub output: Option<Value>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
