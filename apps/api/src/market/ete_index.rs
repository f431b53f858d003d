//! ETE Index: a quarterly 0-100 composite of four market sub-indices.
//!
//! | component            | source                          | normalization                   | weight |
//! |----------------------|---------------------------------|---------------------------------|--------|
//! | talent scarcity      | total demand / total supply     | ratio × 50, capped at 100       | 0.35   |
//! | hiring velocity      | mean time-to-fill (days)        | inverse over [10, 120]          | 0.25   |
//! | market intelligence  | mean confidence (0-1)           | × 100                           | 0.25   |
//! | confidence stability | stddev of confidence            | inverse over [0, 0.25]          | 0.15   |
//!
//! Components without data read as a neutral 50.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::learning::aggregate::SignalType;
use crate::market::signals::{scarcity_index, WINDOW_DAYS};
use crate::market::stats::{mean, round_to, stddev};
use crate::market::store::{AggregateQuery, MarketStore};
use crate::models::learning::{EteIndexSnapshotRow, LearningAggregateRow};

const NEUTRAL_COMPONENT: f64 = 50.0;
const VELOCITY_FAST_DAYS: f64 = 10.0;
const VELOCITY_SLOW_DAYS: f64 = 120.0;
const STABILITY_BOUND: f64 = 0.25;

const W_SCARCITY: f64 = 0.35;
const W_VELOCITY: f64 = 0.25;
const W_INTELLIGENCE: f64 = 0.25;
const W_STABILITY: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EteIndexComponents {
    pub talent_scarcity: f64,
    pub hiring_velocity: f64,
    pub market_intelligence: f64,
    pub confidence_stability: f64,
}

impl EteIndexComponents {
    /// Weighted composite, rounded to one decimal.
    pub fn value(&self) -> f64 {
        round_to(
            (self.talent_scarcity * W_SCARCITY
                + self.hiring_velocity * W_VELOCITY
                + self.market_intelligence * W_INTELLIGENCE
                + self.confidence_stability * W_STABILITY)
                .clamp(0.0, 100.0),
            1,
        )
    }
}

fn values_of(rows: &[LearningAggregateRow], kind: SignalType) -> Vec<f64> {
    rows.iter()
        .filter(|r| r.signal_type.parse::<SignalType>().ok() == Some(kind))
        .map(|r| r.value)
        .filter(|v| v.is_finite())
        .collect()
}

pub fn compute_components(rows: &[LearningAggregateRow]) -> EteIndexComponents {
    let demand: f64 = values_of(rows, SignalType::Demand).iter().sum();
    let supply: f64 = values_of(rows, SignalType::Supply).iter().sum();
    let talent_scarcity = if demand > 0.0 || supply > 0.0 {
        scarcity_index(demand, supply)
    } else {
        NEUTRAL_COMPONENT
    };

    let hiring_velocity = mean(&values_of(rows, SignalType::TimeToFill))
        .map(|days| {
            let span = VELOCITY_SLOW_DAYS - VELOCITY_FAST_DAYS;
            ((VELOCITY_SLOW_DAYS - days) / span * 100.0).clamp(0.0, 100.0)
        })
        .unwrap_or(NEUTRAL_COMPONENT);

    let confidence = values_of(rows, SignalType::Confidence);
    let market_intelligence = mean(&confidence)
        .map(|c| (c * 100.0).clamp(0.0, 100.0))
        .unwrap_or(NEUTRAL_COMPONENT);
    let confidence_stability = stddev(&confidence)
        .map(|s| (1.0 - (s / STABILITY_BOUND).min(1.0)) * 100.0)
        .unwrap_or(NEUTRAL_COMPONENT);

    EteIndexComponents {
        talent_scarcity: round_to(talent_scarcity, 1),
        hiring_velocity: round_to(hiring_velocity, 1),
        market_intelligence: round_to(market_intelligence, 1),
        confidence_stability: round_to(confidence_stability, 1),
    }
}

/// Fiscal quarter label on UTC calendar quarters, e.g. `2026-Q1`.
pub fn quarter_period(at: DateTime<Utc>) -> String {
    format!("{}-Q{}", at.year(), (at.month() - 1) / 3 + 1)
}

/// Quarter-over-quarter change in percent, one decimal. `None` without a usable prior.
pub fn delta_percent(value: f64, prior: Option<&EteIndexSnapshotRow>) -> Option<f64> {
    let prior = prior?;
    if prior.value == 0.0 {
        return None;
    }
    Some(round_to((value - prior.value) / prior.value * 100.0, 1))
}

/// `prior_period` is the snapshot compared against, if any; a zero prior has no delta.
pub fn headline(period: &str, value: f64, delta: Option<f64>, prior_period: Option<&str>) -> String {
    match (delta, prior_period) {
        (None, None) => format!("ETE Index {period} at {value:.1}, establishing the baseline."),
        (None, Some(prior)) => format!(
            "ETE Index {period} at {value:.1}, QoQ change undefined against a zero reading in {prior}."
        ),
        (Some(d), _) if d > 0.0 => format!("ETE Index {period} at {value:.1}, up {d:.1}% QoQ."),
        (Some(d), _) if d < 0.0 => format!("ETE Index {period} at {value:.1}, down {:.1}% QoQ.", d.abs()),
        (Some(_), _) => format!("ETE Index {period} at {value:.1}, holding flat 0.0% QoQ."),
    }
}

pub fn compose_snapshot(
    components: EteIndexComponents,
    prior: Option<&EteIndexSnapshotRow>,
    now: DateTime<Utc>,
) -> EteIndexSnapshotRow {
    let period = quarter_period(now);
    let value = components.value();
    let delta = delta_percent(value, prior);

    EteIndexSnapshotRow {
        id: Uuid::new_v4(),
        headline: headline(&period, value, delta, prior.map(|p| p.period.as_str())),
        period,
        value,
        talent_scarcity: components.talent_scarcity,
        hiring_velocity: components.hiring_velocity,
        market_intelligence: components.market_intelligence,
        confidence_stability: components.confidence_stability,
        delta_percent: delta,
        computed_at: now,
    }
}

/// Recomputes the current quarter's snapshot from fresh (uncached) aggregates.
pub async fn build_ete_index(store: &dyn MarketStore, now: DateTime<Utc>) -> Result<EteIndexSnapshotRow, AppError> {
    let rows = store
        .load_aggregates(
            &AggregateQuery {
                since: now - Duration::days(WINDOW_DAYS),
                role_family: None,
                region: None,
            },
            true,
        )
        .await?;

    let components = compute_components(&rows);
    let period = quarter_period(now);
    let prior = store.latest_snapshot_other_than(&period).await?;
    let snapshot = compose_snapshot(components, prior.as_ref(), now);
    let saved = store.upsert_ete_snapshot(&snapshot).await?;

    info!(period = %saved.period, value = saved.value, delta = ?saved.delta_percent, "ETE index built");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::signals::tests::aggregate;
    use crate::testing::MemoryStore;
    use chrono::TimeZone;

    fn snapshot(period: &str, value: f64, computed_at: DateTime<Utc>) -> EteIndexSnapshotRow {
        EteIndexSnapshotRow {
            id: Uuid::new_v4(),
            period: period.to_string(),
            value,
            talent_scarcity: 0.0,
            hiring_velocity: 0.0,
            market_intelligence: 0.0,
            confidence_stability: 0.0,
            delta_percent: None,
            headline: String::new(),
            computed_at,
        }
    }

    #[test]
    fn test_quarter_periods() {
        assert_eq!(quarter_period(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()), "2026-Q1");
        assert_eq!(quarter_period(Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap()), "2026-Q1");
        assert_eq!(quarter_period(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()), "2026-Q2");
        assert_eq!(quarter_period(Utc.with_ymd_and_hms(2025, 12, 15, 0, 0, 0).unwrap()), "2025-Q4");
    }

    #[test]
    fn test_quarter_over_quarter_delta_and_headline() {
        let components = EteIndexComponents {
            talent_scarcity: 80.0,
            hiring_velocity: 40.0,
            market_intelligence: 60.0,
            confidence_stability: 44.0,
        };
        assert_eq!(components.value(), 59.6);

        let prior = snapshot("2025-Q4", 53.0, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let snap = compose_snapshot(components, Some(&prior), now);

        assert_eq!(snap.period, "2026-Q1");
        assert_eq!(snap.delta_percent, Some(12.5));
        assert!(snap.headline.ends_with("up 12.5% QoQ."));
    }

    #[test]
    fn test_headline_variants() {
        assert_eq!(
            headline("2026-Q1", 50.0, None, None),
            "ETE Index 2026-Q1 at 50.0, establishing the baseline."
        );
        assert!(headline("2026-Q1", 45.0, Some(-10.0), Some("2025-Q4")).ends_with("down 10.0% QoQ."));
        assert!(headline("2026-Q1", 50.0, Some(0.0), Some("2025-Q4")).contains("holding flat"));
    }

    #[test]
    fn test_zero_prior_is_not_reported_as_baseline() {
        let prior = snapshot("2025-Q4", 0.0, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let components = EteIndexComponents {
            talent_scarcity: 50.0,
            hiring_velocity: 50.0,
            market_intelligence: 50.0,
            confidence_stability: 50.0,
        };

        let snap = compose_snapshot(components, Some(&prior), now);

        assert!(snap.delta_percent.is_none());
        assert!(!snap.headline.contains("baseline"));
        assert_eq!(
            snap.headline,
            "ETE Index 2026-Q1 at 50.0, QoQ change undefined against a zero reading in 2025-Q4."
        );
    }

    #[test]
    fn test_components_from_aggregates() {
        let rows = vec![
            aggregate("engineering", "us", "demand", 10.0),
            aggregate("engineering", "us", "supply", 10.0),
            aggregate("engineering", "us", "time_to_fill", 65.0),
            aggregate("engineering", "us", "confidence", 0.7),
            aggregate("engineering", "us", "confidence", 0.7),
        ];
        let c = compute_components(&rows);
        assert_eq!(c.talent_scarcity, 50.0);
        assert_eq!(c.hiring_velocity, 50.0);
        assert_eq!(c.market_intelligence, 70.0);
        assert_eq!(c.confidence_stability, 100.0);
    }

    #[test]
    fn test_components_without_data_are_neutral() {
        let c = compute_components(&[]);
        assert_eq!(c.value(), 50.0);
    }

    #[tokio::test]
    async fn test_build_compares_against_latest_other_period() {
        let store = MemoryStore::default();
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        store.push_ete_snapshot(snapshot("2025-Q3", 40.0, Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap()));
        store.push_ete_snapshot(snapshot("2025-Q4", 50.0, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap()));

        let first = build_ete_index(&store, now).await.unwrap();
        assert_eq!(first.period, "2026-Q1");
        assert_eq!(first.value, 50.0);
        assert_eq!(first.delta_percent, Some(0.0));

        // rebuilding in the same quarter overwrites and still compares against Q4
        let second = build_ete_index(&store, now + Duration::days(3)).await.unwrap();
        assert_eq!(second.delta_percent, Some(0.0));
        assert_eq!(store.ete_snapshots().len(), 3);
        assert_eq!(store.last_aggregate_bypass(), Some(true));
    }

    #[tokio::test]
    async fn test_first_snapshot_is_a_baseline() {
        let store = MemoryStore::default();
        let snap = build_ete_index(&store, Utc::now()).await.unwrap();
        assert!(snap.delta_percent.is_none());
        assert!(snap.headline.contains("baseline"));
    }
}
