use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Raw per-tenant learning signal. Never leaves the tenant except through aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantLearningSignalRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub role_family: String,
    pub industry: Option<String>,
    pub region: String,
    pub signal_type: String,
    pub window_days: i32,
    pub value: f64,
    pub sample_size: i32,
    pub captured_at: DateTime<Utc>,
}

/// Tenant-anonymized benchmark row shared across the network.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LearningAggregateRow {
    pub id: Uuid,
    pub role_family: String,
    pub industry: Option<String>,
    pub region: String,
    pub signal_type: String,
    pub window_days: i32,
    pub value: f64,
    pub sample_size: i64,
    /// Monday 00:00 UTC of the aggregation week.
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EteIndexSnapshotRow {
    pub id: Uuid,
    pub period: String,
    pub value: f64,
    pub talent_scarcity: f64,
    pub hiring_velocity: f64,
    pub market_intelligence: f64,
    pub confidence_stability: f64,
    pub delta_percent: Option<f64>,
    pub headline: String,
    pub computed_at: DateTime<Utc>,
}
