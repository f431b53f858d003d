//! Market data access: learning aggregates in, ETE index snapshots in and out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::learning::{EteIndexSnapshotRow, LearningAggregateRow};
use crate::store::PgStore;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub since: DateTime<Utc>,
    pub role_family: Option<String>,
    pub region: Option<String>,
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    /// With `bypass_cache` the statement is not prepared/cached on the connection.
    async fn load_aggregates(
        &self,
        query: &AggregateQuery,
        bypass_cache: bool,
    ) -> Result<Vec<LearningAggregateRow>, AppError>;

    async fn latest_ete_snapshot(&self) -> Result<Option<EteIndexSnapshotRow>, AppError>;

    /// Most recent snapshot whose period differs from `period`.
    async fn latest_snapshot_other_than(&self, period: &str) -> Result<Option<EteIndexSnapshotRow>, AppError>;

    /// One row per period; a rebuild within the same period overwrites it.
    async fn upsert_ete_snapshot(&self, row: &EteIndexSnapshotRow) -> Result<EteIndexSnapshotRow, AppError>;
}

const AGGREGATES_SQL: &str = r#"
    SELECT * FROM learning_aggregates
    WHERE captured_at >= $1
      AND ($2::TEXT IS NULL OR role_family = $2)
      AND ($3::TEXT IS NULL OR region = $3)
    ORDER BY captured_at, role_family, region
"#;

#[async_trait]
impl MarketStore for PgStore {
    async fn load_aggregates(
        &self,
        query: &AggregateQuery,
        bypass_cache: bool,
    ) -> Result<Vec<LearningAggregateRow>, AppError> {
        Ok(sqlx::query_as::<_, LearningAggregateRow>(AGGREGATES_SQL)
            .bind(query.since)
            .bind(&query.role_family)
            .bind(&query.region)
            .persistent(!bypass_cache)
            .fetch_all(self.pool())
            .await?)
    }

    async fn latest_ete_snapshot(&self) -> Result<Option<EteIndexSnapshotRow>, AppError> {
        Ok(sqlx::query_as::<_, EteIndexSnapshotRow>(
            "SELECT * FROM ete_index_snapshots ORDER BY computed_at DESC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?)
    }

    async fn latest_snapshot_other_than(&self, period: &str) -> Result<Option<EteIndexSnapshotRow>, AppError> {
        Ok(sqlx::query_as::<_, EteIndexSnapshotRow>(
            "SELECT * FROM ete_index_snapshots WHERE period <> $1 ORDER BY computed_at DESC LIMIT 1",
        )
        .bind(period)
        .fetch_optional(self.pool())
        .await?)
    }

    async fn upsert_ete_snapshot(&self, row: &EteIndexSnapshotRow) -> Result<EteIndexSnapshotRow, AppError> {
        Ok(sqlx::query_as::<_, EteIndexSnapshotRow>(
            r#"
            INSERT INTO ete_index_snapshots
                (id, period, value, talent_scarcity, hiring_velocity, market_intelligence,
                 confidence_stability, delta_percent, headline, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (period) DO UPDATE
            SET value = EXCLUDED.value,
                talent_scarcity = EXCLUDED.talent_scarcity,
                hiring_velocity = EXCLUDED.hiring_velocity,
                market_intelligence = EXCLUDED.market_intelligence,
                confidence_stability = EXCLUDED.confidence_stability,
                delta_percent = EXCLUDED.delta_percent,
                headline = EXCLUDED.headline,
                computed_at = EXCLUDED.computed_at
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(&row.period)
        .bind(row.value)
        .bind(row.talent_scarcity)
        .bind(row.hiring_velocity)
        .bind(row.market_intelligence)
        .bind(row.confidence_stability)
        .bind(row.delta_percent)
        .bind(&row.headline)
        .bind(row.computed_at)
        .fetch_one(self.pool())
        .await?)
    }
}
