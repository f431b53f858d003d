//! Market signals derived from the shared learning aggregates over a rolling 90-day window.
//!
//! - skill scarcity: demand/supply per role family and region, scaled so that a 2:1
//!   ratio reads 100 (capped)
//! - confidence distribution: low (<0.33) / medium (<0.66) / high buckets per region
//! - time-to-fill benchmarks: mean and 90th percentile per region and role family
//! - oversupplied roles: supply/demand ≥ 1.5, top 10 by ratio
//!
//! Tenants in fire_drill or demo mode get an empty payload.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::learning::aggregate::SignalType;
use crate::market::cache::SignalCache;
use crate::market::stats::{mean, percentile, round_to};
use crate::market::store::{AggregateQuery, MarketStore};
use crate::models::learning::LearningAggregateRow;
use crate::models::tenant::SystemMode;

pub const WINDOW_DAYS: i64 = 90;
const SCARCITY_SCALE: f64 = 50.0;
const LOW_CONFIDENCE_BELOW: f64 = 0.33;
const MEDIUM_CONFIDENCE_BELOW: f64 = 0.66;
const OVERSUPPLY_RATIO: f64 = 1.5;
const OVERSUPPLY_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct MarketSignalsQuery {
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub system_mode: SystemMode,
    pub role_family: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub bypass_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScarcitySignal {
    pub role_family: String,
    pub region: String,
    pub demand: f64,
    pub supply: f64,
    /// `None` when there is demand but no recorded supply.
    pub ratio: Option<f64>,
    pub scarcity_index: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    pub region: String,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToFillBenchmark {
    pub region: String,
    pub role_family: String,
    pub mean_days: f64,
    pub p90_days: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OversuppliedRole {
    pub role_family: String,
    pub region: String,
    pub supply: f64,
    pub demand: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSignals {
    pub window_days: i64,
    pub system_mode: SystemMode,
    pub skill_scarcity: Vec<ScarcitySignal>,
    pub confidence_distribution: Vec<ConfidenceDistribution>,
    pub time_to_fill: Vec<TimeToFillBenchmark>,
    pub oversupplied_roles: Vec<OversuppliedRole>,
}

impl MarketSignals {
    pub fn empty(system_mode: SystemMode) -> Self {
        Self {
            window_days: WINDOW_DAYS,
            system_mode,
            skill_scarcity: Vec::new(),
            confidence_distribution: Vec::new(),
            time_to_fill: Vec::new(),
            oversupplied_roles: Vec::new(),
        }
    }
}

pub fn scarcity_index(demand: f64, supply: f64) -> f64 {
    if supply <= 0.0 {
        return if demand > 0.0 { 100.0 } else { 0.0 };
    }
    round_to((demand / supply * SCARCITY_SCALE).clamp(0.0, 100.0), 1)
}

fn signal_type(row: &LearningAggregateRow) -> Option<SignalType> {
    row.signal_type.parse().ok()
}

/// Demand and supply totals per (role family, region).
fn demand_supply(rows: &[LearningAggregateRow]) -> BTreeMap<(String, String), (f64, f64)> {
    let mut totals: BTreeMap<(String, String), (f64, f64)> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.value.is_finite()) {
        let slot = match signal_type(row) {
            Some(SignalType::Demand) => 0,
            Some(SignalType::Supply) => 1,
            _ => continue,
        };
        let entry = totals
            .entry((row.role_family.clone(), row.region.clone()))
            .or_insert((0.0, 0.0));
        if slot == 0 {
            entry.0 += row.value;
        } else {
            entry.1 += row.value;
        }
    }
    totals
}

/// Pure computation over already-loaded aggregates.
pub fn compute_market_signals(rows: &[LearningAggregateRow], system_mode: SystemMode) -> MarketSignals {
    let totals = demand_supply(rows);

    let mut skill_scarcity: Vec<ScarcitySignal> = totals
        .iter()
        .filter(|(_, (demand, _))| *demand > 0.0)
        .map(|((role_family, region), (demand, supply))| ScarcitySignal {
            role_family: role_family.clone(),
            region: region.clone(),
            demand: *demand,
            supply: *supply,
            ratio: (*supply > 0.0).then(|| round_to(demand / supply, 4)),
            scarcity_index: scarcity_index(*demand, *supply),
        })
        .collect();
    skill_scarcity.sort_by(|a, b| b.scarcity_index.total_cmp(&a.scarcity_index));

    let mut oversupplied_roles: Vec<OversuppliedRole> = totals
        .iter()
        .filter(|(_, (demand, supply))| *demand > 0.0 && supply / demand >= OVERSUPPLY_RATIO)
        .map(|((role_family, region), (demand, supply))| OversuppliedRole {
            role_family: role_family.clone(),
            region: region.clone(),
            supply: *supply,
            demand: *demand,
            ratio: round_to(supply / demand, 4),
        })
        .collect();
    oversupplied_roles.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
    oversupplied_roles.truncate(OVERSUPPLY_LIMIT);

    let mut buckets: BTreeMap<String, ConfidenceDistribution> = BTreeMap::new();
    for row in rows
        .iter()
        .filter(|r| signal_type(r) == Some(SignalType::Confidence) && r.value.is_finite())
    {
        let bucket = buckets.entry(row.region.clone()).or_insert_with(|| ConfidenceDistribution {
            region: row.region.clone(),
            ..Default::default()
        });
        if row.value < LOW_CONFIDENCE_BELOW {
            bucket.low += 1;
        } else if row.value < MEDIUM_CONFIDENCE_BELOW {
            bucket.medium += 1;
        } else {
            bucket.high += 1;
        }
    }

    let mut ttf: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for row in rows.iter().filter(|r| signal_type(r) == Some(SignalType::TimeToFill)) {
        ttf.entry((row.region.clone(), row.role_family.clone()))
            .or_default()
            .push(row.value);
    }
    let time_to_fill = ttf
        .into_iter()
        .filter_map(|((region, role_family), values)| {
            Some(TimeToFillBenchmark {
                mean_days: round_to(mean(&values)?, 1),
                p90_days: round_to(percentile(&values, 0.9)?, 1),
                samples: values.len(),
                region,
                role_family,
            })
        })
        .collect();

    MarketSignals {
        window_days: WINDOW_DAYS,
        system_mode,
        skill_scarcity,
        confidence_distribution: buckets.into_values().collect(),
        time_to_fill,
        oversupplied_roles,
    }
}

pub fn cache_key(query: &MarketSignalsQuery) -> String {
    format!(
        "market-signals:{}:{}:{}",
        query.tenant_id.map(|t| t.to_string()).unwrap_or_else(|| "*".to_string()),
        query.role_family.as_deref().unwrap_or("*"),
        query.region.as_deref().unwrap_or("*"),
    )
}

pub async fn get_market_signals(
    store: &dyn MarketStore,
    cache: Option<&dyn SignalCache>,
    query: &MarketSignalsQuery,
    cache_ttl_secs: u64,
    now: DateTime<Utc>,
) -> Result<MarketSignals, AppError> {
    if query.system_mode.suppresses_learning() {
        debug!(system_mode = %query.system_mode, "Market signals suppressed");
        return Ok(MarketSignals::empty(query.system_mode));
    }

    let key = cache_key(query);
    if let (Some(cache), false) = (cache, query.bypass_cache) {
        match cache.get_cached(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<MarketSignals>(&raw) {
                Ok(signals) => return Ok(signals),
                Err(e) => warn!(%key, error = %e, "Discarding unreadable cached market signals"),
            },
            Ok(None) => {}
            Err(e) => warn!(%key, error = %e, "Market signal cache read failed"),
        }
    }

    let rows = store
        .load_aggregates(
            &AggregateQuery {
                since: now - Duration::days(WINDOW_DAYS),
                role_family: query.role_family.clone(),
                region: query.region.clone(),
            },
            query.bypass_cache,
        )
        .await?;
    let signals = compute_market_signals(&rows, query.system_mode);

    if let Some(cache) = cache {
        match serde_json::to_string(&signals) {
            Ok(raw) => {
                if let Err(e) = cache.put_cached(&key, &raw, cache_ttl_secs).await {
                    warn!(%key, error = %e, "Market signal cache write failed");
                }
            }
            Err(e) => warn!(%key, error = %e, "Failed to serialize market signals"),
        }
    }

    Ok(signals)
}
