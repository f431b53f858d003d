//! Network learning aggregation.
//!
//! Weekly job that folds opted-in tenants' raw learning signals into anonymized
//! benchmark rows. Signals from tenants without `network_learning_opt_in`, and signals
//! whose sample size is below the minimum, never contribute. Each run replaces the
//! aggregates of the current (Monday-start, UTC) week, so re-runs are idempotent.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::learning::{LearningAggregateRow, TenantLearningSignalRow};
use crate::store::PgStore;

pub const DEFAULT_MIN_SAMPLE_SIZE: i32 = 10;

/// Raw signals older than this are not part of a weekly run.
const LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Demand,
    Supply,
    TimeToFill,
    Confidence,
    ShortlistRate,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Demand => "demand",
            SignalType::Supply => "supply",
            SignalType::TimeToFill => "time_to_fill",
            SignalType::Confidence => "confidence",
            SignalType::ShortlistRate => "shortlist_rate",
        }
    }
}

impl FromStr for SignalType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "demand" => Ok(SignalType::Demand),
            "supply" => Ok(SignalType::Supply),
            "time_to_fill" => Ok(SignalType::TimeToFill),
            "confidence" => Ok(SignalType::Confidence),
            "shortlist_rate" => Ok(SignalType::ShortlistRate),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSummary {
    pub created: usize,
    pub tenants_considered: usize,
    pub signals_evaluated: usize,
}

#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn opted_in_tenants(&self) -> Result<Vec<Uuid>, AppError>;

    async fn load_learning_signals(
        &self,
        tenant_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<TenantLearningSignalRow>, AppError>;

    /// Deletes every aggregate stamped `week_start` and inserts `rows` in its place.
    async fn replace_week_aggregates(
        &self,
        week_start: DateTime<Utc>,
        rows: &[LearningAggregateRow],
    ) -> Result<usize, AppError>;

    async fn delete_learning_signals_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = now.weekday().num_days_from_monday() as i64;
    let monday = now.date_naive() - Duration::days(days_since_monday);
    monday.and_time(NaiveTime::MIN).and_utc()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

type GroupKey = (String, Option<String>, String, SignalType, i32);

/// Pure aggregation over already-loaded signals.
///
/// Rows from tenants outside `opted_in`, rows below `min_sample_size`, unknown signal
/// types and non-finite values are dropped before grouping. Each group's value is the
/// sample-size-weighted mean, rounded to 4 decimals.
pub fn aggregate_signals(
    signals: &[TenantLearningSignalRow],
    opted_in: &HashSet<Uuid>,
    min_sample_size: i32,
    captured_at: DateTime<Utc>,
) -> Vec<LearningAggregateRow> {
    let mut groups: BTreeMap<GroupKey, (f64, i64)> = BTreeMap::new();

    for signal in signals {
        if !opted_in.contains(&signal.tenant_id) {
            continue;
        }
        if signal.sample_size < min_sample_size || signal.sample_size <= 0 || !signal.value.is_finite() {
            continue;
        }
        let Ok(signal_type) = signal.signal_type.parse::<SignalType>() else {
            debug!(signal_type = %signal.signal_type, "Skipping unknown learning signal type");
            continue;
        };

        let key = (
            signal.role_family.clone(),
            signal.industry.clone(),
            signal.region.clone(),
            signal_type,
            signal.window_days,
        );
        let entry = groups.entry(key).or_insert((0.0, 0));
        entry.0 += signal.value * signal.sample_size as f64;
        entry.1 += signal.sample_size as i64;
    }

    groups
        .into_iter()
        .map(
            |((role_family, industry, region, signal_type, window_days), (weighted, samples))| {
                LearningAggregateRow {
                    id: Uuid::new_v4(),
                    role_family,
                    industry,
                    region,
                    signal_type: signal_type.as_str().to_string(),
                    window_days,
                    value: round4(weighted / samples as f64),
                    sample_size: samples,
                    captured_at,
                }
            },
        )
        .collect()
}

pub async fn aggregate_learning(
    store: &dyn LearningStore,
    min_sample_size: i32,
    now: DateTime<Utc>,
) -> Result<AggregationSummary, AppError> {
    let tenants = store.opted_in_tenants().await?;
    if tenants.is_empty() {
        info!("No tenants opted into network learning");
        return Ok(AggregationSummary::default());
    }

    let signals = store
        .load_learning_signals(&tenants, now - Duration::days(LOOKBACK_DAYS))
        .await?;
    if signals.is_empty() {
        info!(tenants = tenants.len(), "No learning signals to aggregate");
        return Ok(AggregationSummary {
            created: 0,
            tenants_considered: tenants.len(),
            signals_evaluated: 0,
        });
    }

    let opted_in: HashSet<Uuid> = tenants.iter().copied().collect();
    let week = week_start(now);
    let rows = aggregate_signals(&signals, &opted_in, min_sample_size, week);
    if rows.is_empty() {
        info!(
            tenants = tenants.len(),
            signals = signals.len(),
            "No eligible learning signals after suppression"
        );
        return Ok(AggregationSummary {
            created: 0,
            tenants_considered: tenants.len(),
            signals_evaluated: signals.len(),
        });
    }
    let created = store.replace_week_aggregates(week, &rows).await?;

    info!(
        week_start = %week,
        created,
        tenants = tenants.len(),
        signals = signals.len(),
        "Learning aggregation complete"
    );
    Ok(AggregationSummary {
        created,
        tenants_considered: tenants.len(),
        signals_evaluated: signals.len(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LearningStore for PgStore {
    async fn opted_in_tenants(&self) -> Result<Vec<Uuid>, AppError> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            "SELECT tenant_id FROM tenant_configs WHERE network_learning_opt_in = TRUE ORDER BY tenant_id",
        )
        .fetch_all(self.pool())
        .await?)
    }

    async fn load_learning_signals(
        &self,
        tenant_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<TenantLearningSignalRow>, AppError> {
        Ok(sqlx::query_as::<_, TenantLearningSignalRow>(
            r#"
            SELECT * FROM tenant_learning_signals
            WHERE tenant_id = ANY($1) AND captured_at >= $2
            "#,
        )
        .bind(tenant_ids)
        .bind(since)
        .fetch_all(self.pool())
        .await?)
    }

    async fn replace_week_aggregates(
        &self,
        week_start: DateTime<Utc>,
        rows: &[LearningAggregateRow],
    ) -> Result<usize, AppError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM learning_aggregates WHERE captured_at = $1")
            .bind(week_start)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO learning_aggregates
                    (id, role_family, industry, region, signal_type, window_days, value, sample_size, captured_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(row.id)
            .bind(&row.role_family)
            .bind(&row.industry)
            .bind(&row.region)
            .bind(&row.signal_type)
            .bind(row.window_days)
            .bind(row.value)
            .bind(row.sample_size)
            .bind(row.captured_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    async fn delete_learning_signals_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM tenant_learning_signals WHERE captured_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
