//! Time-to-fill risk.
//!
//! Tenant-wide baselines (target shortlist size, shortlist rate, matches per day) back
//! up jobs with too little data of their own. Each open job gets an estimate, which is
//! compared to the median across jobs, plus stage-velocity and confidence-mix checks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;
use crate::market::stats::{mean, median, round_to};
use crate::models::job::StageEntry;
use crate::store::PgStore;

const MIN_TARGET_SHORTLIST: f64 = 3.0;
const MEDIAN_RISK_FACTOR: f64 = 1.25;
const SLOW_STAGE_DAYS: f64 = 8.0;
const LOW_CONFIDENCE_BELOW: i32 = 45;
const HIGH_CONFIDENCE_FROM: i32 = 70;
const LOW_CONFIDENCE_RISK_SHARE: f64 = 0.35;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq)]
pub struct JobForecastInput {
    pub job_id: Uuid,
    pub job_title: String,
    pub opened_at: DateTime<Utc>,
    /// Distinct candidates matched to the job.
    pub matches: i64,
    pub shortlisted: i64,
    /// One stage history per linked candidate.
    pub stage_histories: Vec<Vec<StageEntry>>,
    /// Latest candidate-signal score per matched candidate.
    pub candidate_signal_scores: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastBaselines {
    pub target_shortlist: f64,
    pub shortlist_rate: f64,
    pub matches_per_day: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceHealth {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub low_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToFillRisk {
    pub job_id: Uuid,
    pub job_title: String,
    pub estimated_time_to_fill_days: Option<f64>,
    pub market_median_time_to_fill_days: Option<f64>,
    pub stage_velocity_days: Option<f64>,
    pub confidence_health: ConfidenceHealth,
    pub risk_flags: Vec<String>,
}

fn days_open(input: &JobForecastInput, now: DateTime<Utc>) -> f64 {
    let seconds = (now - input.opened_at).num_seconds().max(0) as f64;
    (seconds / SECONDS_PER_DAY).max(1.0)
}

pub fn compute_baselines(inputs: &[JobForecastInput], now: DateTime<Utc>) -> ForecastBaselines {
    let observed: Vec<f64> = inputs
        .iter()
        .filter(|j| j.shortlisted > 0)
        .map(|j| j.shortlisted as f64)
        .collect();
    let target_shortlist = mean(&observed)
        .map(|m| m.round().max(MIN_TARGET_SHORTLIST))
        .unwrap_or(MIN_TARGET_SHORTLIST);

    let total_matches: i64 = inputs.iter().map(|j| j.matches.max(0)).sum();
    let total_shortlisted: i64 = inputs.iter().map(|j| j.shortlisted.max(0)).sum();
    let total_days: f64 = inputs.iter().map(|j| days_open(j, now)).sum();

    ForecastBaselines {
        target_shortlist,
        shortlist_rate: if total_matches > 0 {
            total_shortlisted as f64 / total_matches as f64
        } else {
            0.0
        },
        matches_per_day: if total_days > 0.0 {
            total_matches as f64 / total_days
        } else {
            0.0
        },
    }
}

fn estimate_days(input: &JobForecastInput, baselines: &ForecastBaselines, now: DateTime<Utc>) -> Option<f64> {
    let open = days_open(input, now);
    let shortlisted = input.shortlisted.max(0) as f64;
    if shortlisted >= baselines.target_shortlist {
        return Some(round_to(open, 1));
    }

    let matches_per_day = if input.matches > 0 {
        input.matches as f64 / open
    } else {
        baselines.matches_per_day
    };
    let shortlist_rate = if input.matches > 0 && input.shortlisted > 0 {
        shortlisted / input.matches as f64
    } else {
        baselines.shortlist_rate
    };
    if matches_per_day <= 0.0 || shortlist_rate <= 0.0 {
        return None;
    }

    let remaining_matches = (baselines.target_shortlist - shortlisted) / shortlist_rate;
    Some(round_to(open + remaining_matches / matches_per_day, 1))
}

/// Mean days between consecutive stage entries across all candidates.
pub fn stage_velocity_days(histories: &[Vec<StageEntry>]) -> Option<f64> {
    let mut gaps = Vec::new();
    for history in histories {
        let mut entries: Vec<&StageEntry> = history.iter().collect();
        entries.sort_by_key(|e| e.entered_at);
        for pair in entries.windows(2) {
            let seconds = (pair[1].entered_at - pair[0].entered_at).num_seconds() as f64;
            gaps.push(seconds / SECONDS_PER_DAY);
        }
    }
    mean(&gaps).map(|d| round_to(d, 1))
}

pub fn confidence_health(scores: &[i32]) -> ConfidenceHealth {
    let mut health = ConfidenceHealth::default();
    for &score in scores {
        if score < LOW_CONFIDENCE_BELOW {
            health.low += 1;
        } else if score >= HIGH_CONFIDENCE_FROM {
            health.high += 1;
        } else {
            health.medium += 1;
        }
    }
    if !scores.is_empty() {
        health.low_share = round_to(health.low as f64 / scores.len() as f64, 4);
    }
    health
}

pub fn evaluate_time_to_fill_risk(inputs: &[JobForecastInput], now: DateTime<Utc>) -> Vec<TimeToFillRisk> {
    if inputs.is_empty() {
        return Vec::new();
    }

    let baselines = compute_baselines(inputs, now);
    let estimates: Vec<Option<f64>> = inputs.iter().map(|j| estimate_days(j, &baselines, now)).collect();
    let known: Vec<f64> = estimates.iter().flatten().copied().collect();
    let market_median = median(&known).map(|m| round_to(m, 1));

    inputs
        .iter()
        .zip(estimates)
        .map(|(input, estimate)| {
            let mut risk_flags = Vec::new();

            if let (Some(est), Some(med)) = (estimate, market_median) {
                if med > 0.0 && est >= med * MEDIAN_RISK_FACTOR {
                    risk_flags.push(format!(
                        "Forecast exceeds market median ({est:.1} vs {med:.1} days)"
                    ));
                }
            }

            let velocity = stage_velocity_days(&input.stage_histories);
            match velocity {
                None => risk_flags.push("No candidate stage movement yet".to_string()),
                Some(v) if v > SLOW_STAGE_DAYS => {
                    risk_flags.push(format!("Stage velocity slow ({v:.1} days per stage)"))
                }
                Some(_) => {}
            }

            let health = confidence_health(&input.candidate_signal_scores);
            if health.low >= 1 && health.low_share >= LOW_CONFIDENCE_RISK_SHARE {
                risk_flags.push(format!(
                    "Low-confidence matches make up {:.0}% of the pipeline",
                    health.low_share * 100.0
                ));
            }

            TimeToFillRisk {
                job_id: input.job_id,
                job_title: input.job_title.clone(),
                estimated_time_to_fill_days: estimate,
                market_median_time_to_fill_days: market_median,
                stage_velocity_days: velocity,
                confidence_health: health,
                risk_flags,
            }
        })
        .collect()
}

#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Open jobs of the tenant with their match, shortlist and stage data.
    async fn load_forecast_inputs(&self, tenant_id: Uuid) -> Result<Vec<JobForecastInput>, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres
// ────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct OpenJobRow {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MatchCountRow {
    job_req_id: Uuid,
    matches: i64,
    shortlisted: i64,
}

#[derive(FromRow)]
struct LatestSignalRow {
    job_req_id: Uuid,
    candidate_signal_score: i32,
}

#[derive(FromRow)]
struct StageHistoryRow {
    job_req_id: Uuid,
    stages: Json<Vec<StageEntry>>,
}

#[async_trait]
impl ForecastStore for PgStore {
    async fn load_forecast_inputs(&self, tenant_id: Uuid) -> Result<Vec<JobForecastInput>, AppError> {
        let jobs = sqlx::query_as::<_, OpenJobRow>(
            "SELECT id, title, created_at FROM job_reqs WHERE tenant_id = $1 AND status = 'open' ORDER BY created_at, id",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        let counts: HashMap<Uuid, MatchCountRow> = sqlx::query_as::<_, MatchCountRow>(
            r#"
            SELECT job_req_id,
                   COUNT(DISTINCT candidate_id)::BIGINT AS matches,
                   COUNT(DISTINCT candidate_id) FILTER (WHERE shortlisted)::BIGINT AS shortlisted
            FROM match_results
            WHERE tenant_id = $1
            GROUP BY job_req_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .map(|row| (row.job_req_id, row))
        .collect();

        let mut scores: HashMap<Uuid, Vec<i32>> = HashMap::new();
        for row in sqlx::query_as::<_, LatestSignalRow>(
            r#"
            SELECT DISTINCT ON (job_req_id, candidate_id) job_req_id, candidate_signal_score
            FROM match_results
            WHERE tenant_id = $1
            ORDER BY job_req_id, candidate_id, created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?
        {
            scores.entry(row.job_req_id).or_default().push(row.candidate_signal_score);
        }

        let mut stages: HashMap<Uuid, Vec<Vec<StageEntry>>> = HashMap::new();
        for row in sqlx::query_as::<_, StageHistoryRow>(
            "SELECT job_req_id, stages FROM job_candidates WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?
        {
            stages.entry(row.job_req_id).or_default().push(row.stages.0);
        }

        Ok(jobs
            .into_iter()
            .map(|job| {
                let (matches, shortlisted) = counts
                    .get(&job.id)
                    .map(|c| (c.matches, c.shortlisted))
                    .unwrap_or((0, 0));
                JobForecastInput {
                    job_id: job.id,
                    job_title: job.title,
                    opened_at: job.created_at,
                    matches,
                    shortlisted,
                    stage_histories: stages.remove(&job.id).unwrap_or_default(),
                    candidate_signal_scores: scores.remove(&job.id).unwrap_or_default(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    }

    fn history(gaps_days: &[i64]) -> Vec<StageEntry> {
        let mut at = now() - Duration::days(60);
        let mut entries = vec![StageEntry {
            stage: "matched".to_string(),
            entered_at: at,
        }];
        for (i, gap) in gaps_days.iter().enumerate() {
            at += Duration::days(*gap);
            entries.push(StageEntry {
                stage: format!("stage-{i}"),
                entered_at: at,
            });
        }
        entries
    }

    fn job(days_open: i64, matches: i64, shortlisted: i64) -> JobForecastInput {
        JobForecastInput {
            job_id: Uuid::new_v4(),
            job_title: "Platform Engineer".to_string(),
            opened_at: now() - Duration::days(days_open),
            matches,
            shortlisted,
            stage_histories: vec![history(&[2, 4])],
            candidate_signal_scores: vec![80, 60],
        }
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(evaluate_time_to_fill_risk(&[], now()).is_empty());
    }

    #[test]
    fn test_baselines() {
        let b = compute_baselines(&[job(10, 20, 4), job(10, 20, 0)], now());
        assert_eq!(b.target_shortlist, 4.0);
        assert_eq!(b.shortlist_rate, 0.1);
        assert_eq!(b.matches_per_day, 2.0);

        let thin = compute_baselines(&[job(10, 0, 1)], now());
        assert_eq!(thin.target_shortlist, 3.0);
    }

    #[test]
    fn test_filled_job_estimate_is_days_open() {
        let risks = evaluate_time_to_fill_risk(&[job(12, 30, 5)], now());
        assert_eq!(risks[0].estimated_time_to_fill_days, Some(12.0));
    }

    #[test]
    fn test_projection_and_median_flag() {
        // baselines: target 3, rate 6/40 = 0.15, 40 matches over 20 days = 2/day
        let fast = job(10, 20, 3);
        let slow = job(10, 20, 3);
        let stalled = JobForecastInput {
            matches: 0,
            shortlisted: 0,
            ..job(10, 0, 0)
        };
        let risks = evaluate_time_to_fill_risk(&[fast, slow, stalled], now());

        // stalled: 10 days open + (3 / 0.15) / (40 / 30) = 10 + 15 = 25
        assert_eq!(risks[2].estimated_time_to_fill_days, Some(25.0));
        assert_eq!(risks[0].market_median_time_to_fill_days, Some(10.0));
        assert!(risks[2].risk_flags.iter().any(|f| f.starts_with("Forecast exceeds market median")));
        assert!(!risks[0].risk_flags.iter().any(|f| f.starts_with("Forecast exceeds")));
    }

    #[test]
    fn test_stage_velocity_flags() {
        assert_eq!(stage_velocity_days(&[history(&[2, 4])]), Some(3.0));
        assert_eq!(stage_velocity_days(&[history(&[])]), None);

        let mut slow = job(10, 20, 3);
        slow.stage_histories = vec![history(&[10, 12])];
        let mut idle = job(10, 20, 3);
        idle.stage_histories = vec![history(&[])];
        let risks = evaluate_time_to_fill_risk(&[slow, idle], now());

        assert!(risks[0].risk_flags.iter().any(|f| f.starts_with("Stage velocity slow")));
        assert!(risks[1]
            .risk_flags
            .iter()
            .any(|f| f == "No candidate stage movement yet"));
    }

    #[test]
    fn test_confidence_health_flag() {
        let health = confidence_health(&[10, 20, 50, 90]);
        assert_eq!((health.low, health.medium, health.high), (2, 1, 1));
        assert_eq!(health.low_share, 0.5);
        assert_eq!(confidence_health(&[]).low_share, 0.0);

        let mut risky = job(10, 20, 3);
        risky.candidate_signal_scores = vec![10, 20, 90];
        let mut healthy = job(10, 20, 3);
        healthy.candidate_signal_scores = vec![10, 60, 70, 90];
        let risks = evaluate_time_to_fill_risk(&[risky, healthy], now());

        assert!(risks[0].risk_flags.iter().any(|f| f.starts_with("Low-confidence")));
        assert!(!risks[1].risk_flags.iter().any(|f| f.starts_with("Low-confidence")));
    }

    #[tokio::test]
    async fn test_inputs_follow_matches_and_links() {
        use crate::matching::batch::{match_job_to_all_candidates, BatchMatchContext};
        use crate::models::tenant::Guardrails;
        use crate::scoring::confidence::tests::make_candidate;
        use crate::scoring::config::ScoringConfig;
        use crate::scoring::match_score::tests::make_job;
        use crate::testing::MemoryStore;

        let store = MemoryStore::default();
        let tenant = Uuid::new_v4();
        let job = store.insert_job(tenant, make_job(&["Rust"], &[]));
        let mut closed = make_job(&["Rust"], &[]);
        closed.req.status = "closed".to_string();
        store.insert_job(tenant, closed);
        store.insert_candidate(tenant, make_candidate(Uuid::from_u128(1), &["Rust"]));
        store.insert_candidate(tenant, make_candidate(Uuid::from_u128(2), &[]));

        let ctx = BatchMatchContext {
            tenant_id: tenant,
            job_id: job,
            config: ScoringConfig::default(),
            guardrails: Guardrails::default(),
        };
        match_job_to_all_candidates(&store, &ctx).await.unwrap();
        // a rematch adds results but no new distinct candidates
        match_job_to_all_candidates(&store, &ctx).await.unwrap();

        let inputs = store.load_forecast_inputs(tenant).await.unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].job_id, job);
        assert_eq!(inputs[0].matches, 2);
        assert_eq!(inputs[0].shortlisted, 0);
        assert_eq!(inputs[0].stage_histories.len(), 2);
        assert_eq!(inputs[0].candidate_signal_scores.len(), 2);

        let risks = evaluate_time_to_fill_risk(&inputs, now());
        // one "matched" entry per candidate means no movement between stages
        assert_eq!(risks[0].stage_velocity_days, None);
    }
}
