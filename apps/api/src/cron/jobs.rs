//! Scheduled job bodies registered with the cron runner.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::info;

use crate::cron::runner::CronJob;
use crate::db;
use crate::errors::AppError;
use crate::learning::aggregate::{aggregate_learning, LearningStore};
use crate::market::ete_index::build_ete_index;
use crate::market::store::MarketStore;

pub const LEARNING_AGGREGATION_JOB: &str = "learning-aggregation";
pub const ETE_INDEX_JOB: &str = "ete-index";
pub const HEALTH_CHECK_JOB: &str = "health-check";
pub const SIGNAL_RETENTION_JOB: &str = "signal-retention";

/// Weekly anonymized roll-up of opted-in tenants' learning signals.
pub struct LearningAggregationJob {
    pub store: Arc<dyn LearningStore>,
    pub min_sample_size: i32,
}

#[async_trait]
impl CronJob for LearningAggregationJob {
    fn name(&self) -> &'static str {
        LEARNING_AGGREGATION_JOB
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<Value, AppError> {
        let summary = aggregate_learning(self.store.as_ref(), self.min_sample_size, now).await?;
        Ok(serde_json::to_value(summary).map_err(anyhow::Error::from)?)
    }
}

pub struct EteIndexJob {
    pub store: Arc<dyn MarketStore>,
}

#[async_trait]
impl CronJob for EteIndexJob {
    fn name(&self) -> &'static str {
        ETE_INDEX_JOB
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<Value, AppError> {
        let snapshot = build_ete_index(self.store.as_ref(), now).await?;
        Ok(json!({
            "period": snapshot.period,
            "value": snapshot.value,
            "delta_percent": snapshot.delta_percent,
        }))
    }
}

pub struct HealthCheckJob {
    pub pool: PgPool,
}

#[async_trait]
impl CronJob for HealthCheckJob {
    fn name(&self) -> &'static str {
        HEALTH_CHECK_JOB
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<Value, AppError> {
        db::ping(&self.pool).await?;
        Ok(json!({ "database": "ok", "checked_at": now }))
    }
}

/// Deletes raw tenant learning signals older than the retention window.
pub struct SignalRetentionJob {
    pub store: Arc<dyn LearningStore>,
    pub retention_days: i64,
}

#[async_trait]
impl CronJob for SignalRetentionJob {
    fn name(&self) -> &'static str {
        SIGNAL_RETENTION_JOB
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<Value, AppError> {
        if self.retention_days < 1 {
            return Err(AppError::Validation("retention_days must be at least 1".to_string()));
        }
        let cutoff = now - Duration::days(self.retention_days);
        let deleted = self.store.delete_learning_signals_before(cutoff).await?;
        info!(deleted, %cutoff, "Expired learning signals deleted");
        Ok(json!({ "deleted": deleted, "cutoff": cutoff }))
    }
}
