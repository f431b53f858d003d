//! In-memory implementations of the store traits for unit tests.
//!
//! `MemoryStore` is cheap to clone; clones share state, so a test can hand one copy to
//! the code under test and inspect the other.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

use crate::agent_runs::{AgentRunLogUpdate, AgentRunStore, NewAgentRun, NewAgentRunLog};
use crate::cron::job_state::JobStateStore;
use crate::cron::runner::{AuditEvent, AuditSink};
use crate::errors::AppError;
use crate::forecast::time_to_fill::{ForecastStore, JobForecastInput};
use crate::guards::{default_tenant_config, Guards, UsageSnapshot};
use crate::learning::aggregate::LearningStore;
use crate::market::cache::SignalCache;
use crate::market::store::{AggregateQuery, MarketStore};
use crate::matching::feedback::{FeedbackStore, NewMatchFeedback};
use crate::matching::store::{
    JobCandidateLink, MatchStore, MatchTransaction, NewMatchResult, UnitOfWork, MATCHED_STAGE,
};
use crate::models::agent_run::{AgentRunLogRow, AgentRunLogStatus, AgentRunRow, PipelineRunStatus};
use crate::models::candidate::{Candidate, EngagementRow};
use crate::models::job::{JobCandidateRow, JobReq, StageEntry};
use crate::models::job_state::{AsyncJobStateRow, JobStatus};
use crate::models::learning::{EteIndexSnapshotRow, LearningAggregateRow, TenantLearningSignalRow};
use crate::models::matching::{MatchFeedbackRow, MatchResultRow};
use crate::models::tenant::{Guardrails, SystemMode, TenantConfigRow};

#[derive(Default)]
struct State {
    run_logs: Vec<AgentRunLogRow>,
    pipeline_runs: Vec<AgentRunRow>,

    kill_switches: HashMap<String, String>,
    feature_flags: HashMap<(Uuid, String), bool>,
    usage: HashMap<(Uuid, String), (i64, Option<i64>)>,
    tenant_configs: HashMap<Uuid, TenantConfigRow>,

    jobs: Vec<JobReq>,
    candidates: Vec<Candidate>,
    match_results: Vec<MatchResultRow>,
    job_candidates: Vec<JobCandidateRow>,
    transactions_begun: usize,
    failing_links: HashSet<Uuid>,
    feedback: Vec<MatchFeedbackRow>,

    job_states: BTreeMap<String, AsyncJobStateRow>,
    audit_events: Vec<AuditEvent>,

    learning_signals: Vec<TenantLearningSignalRow>,
    learning_aggregates: Vec<LearningAggregateRow>,
    aggregate_loads: usize,
    last_aggregate_bypass: Option<bool>,
    ete_snapshots: Vec<EteIndexSnapshotRow>,
}

impl State {
    fn tenant_config_mut(&mut self, tenant_id: Uuid) -> &mut TenantConfigRow {
        self.tenant_configs
            .entry(tenant_id)
            .or_insert_with(|| default_tenant_config(tenant_id))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store poisoned")
    }

    // ── seeding ──

    pub fn engage_kill_switch(&self, name: &str, reason: &str) {
        self.lock().kill_switches.insert(name.to_string(), reason.to_string());
    }

    pub fn set_feature_flag(&self, tenant_id: Uuid, flag: &str, enabled: bool) {
        self.lock().feature_flags.insert((tenant_id, flag.to_string()), enabled);
    }

    pub fn set_usage(&self, tenant_id: Uuid, resource: &str, used: i64, limit: Option<i64>) {
        self.lock().usage.insert((tenant_id, resource.to_string()), (used, limit));
    }

    pub fn set_guardrails(&self, tenant_id: Uuid, guardrails: Guardrails) {
        self.lock().tenant_config_mut(tenant_id).guardrails = Json(guardrails);
    }

    pub fn set_system_mode(&self, tenant_id: Uuid, mode: SystemMode) {
        self.lock().tenant_config_mut(tenant_id).system_mode = mode.as_str().to_string();
    }

    pub fn set_learning_opt_in(&self, tenant_id: Uuid, opt_in: bool) {
        self.lock().tenant_config_mut(tenant_id).network_learning_opt_in = opt_in;
    }

    /// Stores the job under `tenant_id` and returns its id.
    pub fn insert_job(&self, tenant_id: Uuid, mut job: JobReq) -> Uuid {
        job.req.tenant_id = tenant_id;
        let id = job.req.id;
        self.lock().jobs.push(job);
        id
    }

    /// Stores the candidate under `tenant_id` and returns its id.
    pub fn insert_candidate(&self, tenant_id: Uuid, mut candidate: Candidate) -> Uuid {
        candidate.profile.tenant_id = tenant_id;
        let id = candidate.profile.id;
        self.lock().candidates.push(candidate);
        id
    }

    /// Makes every pipeline-link write for the candidate fail inside its transaction.
    pub fn fail_job_candidate_upsert_for(&self, candidate_id: Uuid) {
        self.lock().failing_links.insert(candidate_id);
    }

    pub fn push_learning_signal(&self, row: TenantLearningSignalRow) {
        self.lock().learning_signals.push(row);
    }

    pub fn set_learning_aggregates(&self, rows: Vec<LearningAggregateRow>) {
        self.lock().learning_aggregates = rows;
    }

    pub fn push_ete_snapshot(&self, row: EteIndexSnapshotRow) {
        self.lock().ete_snapshots.push(row);
    }

    // ── inspection ──

    pub fn run_logs(&self) -> Vec<AgentRunLogRow> {
        self.lock().run_logs.clone()
    }

    pub fn pipeline_runs(&self) -> Vec<AgentRunRow> {
        self.lock().pipeline_runs.clone()
    }

    pub fn usage(&self, tenant_id: Uuid, resource: &str) -> i64 {
        self.lock()
            .usage
            .get(&(tenant_id, resource.to_string()))
            .map(|(used, _)| *used)
            .unwrap_or(0)
    }

    pub fn match_results(&self) -> Vec<MatchResultRow> {
        self.lock().match_results.clone()
    }

    pub fn job_candidates(&self) -> Vec<JobCandidateRow> {
        self.lock().job_candidates.clone()
    }

    pub fn transactions_begun(&self) -> usize {
        self.lock().transactions_begun
    }

    pub fn feedback_rows(&self) -> Vec<MatchFeedbackRow> {
        self.lock().feedback.clone()
    }

    pub fn job_state(&self, job_name: &str) -> Option<AsyncJobStateRow> {
        self.lock().job_states.get(job_name).cloned()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.lock().audit_events.clone()
    }

    pub fn learning_signals(&self) -> Vec<TenantLearningSignalRow> {
        self.lock().learning_signals.clone()
    }

    pub fn learning_aggregates(&self) -> Vec<LearningAggregateRow> {
        self.lock().learning_aggregates.clone()
    }

    pub fn aggregate_loads(&self) -> usize {
        self.lock().aggregate_loads
    }

    pub fn last_aggregate_bypass(&self) -> Option<bool> {
        self.lock().last_aggregate_bypass
    }

    pub fn ete_snapshots(&self) -> Vec<EteIndexSnapshotRow> {
        self.lock().ete_snapshots.clone()
    }
}

/// Latest row per candidate; on equal timestamps the later insert wins.
fn latest_per_candidate<'a>(rows: impl Iterator<Item = &'a MatchResultRow>) -> Vec<MatchResultRow> {
    let mut latest: BTreeMap<Uuid, &MatchResultRow> = BTreeMap::new();
    for row in rows {
        match latest.get(&row.candidate_id) {
            Some(current) if current.created_at > row.created_at => {}
            _ => {
                latest.insert(row.candidate_id, row);
            }
        }
    }
    latest.into_values().cloned().collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Agent runs
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AgentRunStore for MemoryStore {
    async fn create_run_log(&self, new: NewAgentRunLog) -> Result<AgentRunLogRow, AppError> {
        let row = AgentRunLogRow {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            user_id: new.user_id,
            agent_name: new.agent_name,
            status: AgentRunLogStatus::Running.as_str().to_string(),
            input: new.input,
            output: None,
            error_message: None,
            started_at: new.started_at,
            finished_at: None,
            duration_ms: None,
        };
        self.lock().run_logs.push(row.clone());
        Ok(row)
    }

    async fn finish_run_log(&self, id: Uuid, update: AgentRunLogUpdate) -> Result<(), AppError> {
        let mut state = self.lock();
        if let Some(row) = state
            .run_logs
            .iter_mut()
            .find(|r| r.id == id && r.status == AgentRunLogStatus::Running.as_str())
        {
            row.status = update.status.as_str().to_string();
            row.output = update.output;
            row.error_message = update.error_message;
            row.finished_at = Some(update.finished_at);
            row.duration_ms = Some(update.duration_ms);
        }
        Ok(())
    }

    async fn create_pipeline_run(&self, new: NewAgentRun) -> Result<AgentRunRow, AppError> {
        let row = AgentRunRow {
            id: Uuid::new_v4(),
            agent_name: new.agent_name,
            tenant_id: new.tenant_id,
            requested_by: new.requested_by,
            job_id: new.job_id,
            mode: new.mode,
            prompt_meta: new.prompt_meta,
            input: new.input,
            output: None,
            status: PipelineRunStatus::Running.as_str().to_string(),
            started_at: new.started_at,
            finished_at: None,
        };
        self.lock().pipeline_runs.push(row.clone());
        Ok(row)
    }

    async fn finish_pipeline_run(
        &self,
        id: Uuid,
        status: PipelineRunStatus,
        output: Value,
        finished_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut state = self.lock();
        if let Some(row) = state
            .pipeline_runs
            .iter_mut()
            .find(|r| r.id == id && r.status == PipelineRunStatus::Running.as_str())
        {
            row.status = status.as_str().to_string();
            row.output = Some(output);
            row.finished_at = Some(finished_at);
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Guards
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Guards for MemoryStore {
    async fn kill_switch_reason(&self, name: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock().kill_switches.get(name).cloned())
    }

    async fn is_feature_enabled_for_tenant(&self, tenant_id: Uuid, flag: &str) -> Result<bool, AppError> {
        let state = self.lock();
        let tenant = state.feature_flags.get(&(tenant_id, flag.to_string()));
        let global = state.feature_flags.get(&(Uuid::nil(), flag.to_string()));
        Ok(tenant.or(global).copied().unwrap_or(false))
    }

    async fn usage_for(&self, tenant_id: Uuid, resource: &str) -> Result<UsageSnapshot, AppError> {
        let (used, limit) = self
            .lock()
            .usage
            .get(&(tenant_id, resource.to_string()))
            .copied()
            .unwrap_or((0, None));
        Ok(UsageSnapshot { used, limit })
    }

    async fn record_usage(&self, tenant_id: Uuid, resource: &str, amount: i64) -> Result<(), AppError> {
        self.lock()
            .usage
            .entry((tenant_id, resource.to_string()))
            .or_insert((0, None))
            .0 += amount;
        Ok(())
    }

    async fn tenant_config(&self, tenant_id: Uuid) -> Result<TenantConfigRow, AppError> {
        Ok(self
            .lock()
            .tenant_configs
            .get(&tenant_id)
            .cloned()
            .unwrap_or_else(|| default_tenant_config(tenant_id)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Matching
// ────────────────────────────────────────────────────────────────────────────

/// Buffers writes until commit; a rollback (or drop) discards them.
pub struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    results: Vec<MatchResultRow>,
    links: Vec<JobCandidateRow>,
}

#[async_trait]
impl MatchTransaction for MemoryTransaction {
    async fn create_match_result(&mut self, new: NewMatchResult) -> Result<MatchResultRow, AppError> {
        let score = new.score;
        let row = MatchResultRow {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            job_req_id: new.job_req_id,
            candidate_id: new.candidate_id,
            score: score.score,
            skill_score: score.skill_score,
            seniority_score: score.seniority_score,
            location_score: score.location_score,
            candidate_signal_score: score.candidate_signal_score,
            candidate_signal_breakdown: Json(score.candidate_signal_breakdown),
            shortlisted: false,
            shortlist_reason: None,
            reasons: Json(score.reasons),
            created_at: new.created_at,
        };
        self.results.push(row.clone());
        Ok(row)
    }

    async fn upsert_job_candidate(&mut self, link: JobCandidateLink) -> Result<JobCandidateRow, AppError> {
        let same = |r: &JobCandidateRow| {
            r.tenant_id == link.tenant_id && r.job_req_id == link.job_req_id && r.candidate_id == link.candidate_id
        };

        let existing = {
            let state = self.state.lock().expect("memory store poisoned");
            if state.failing_links.contains(&link.candidate_id) {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "job_candidates write rejected for {}",
                    link.candidate_id
                )));
            }
            self.links
                .iter()
                .rev()
                .find(|r| same(*r))
                .or_else(|| state.job_candidates.iter().find(|r| same(*r)))
                .cloned()
        };

        let row = match existing {
            Some(mut row) => {
                row.last_match_id = Some(link.match_id);
                row.updated_at = link.touched_at;
                row
            }
            None => JobCandidateRow {
                id: Uuid::new_v4(),
                tenant_id: link.tenant_id,
                job_req_id: link.job_req_id,
                candidate_id: link.candidate_id,
                status: MATCHED_STAGE.to_string(),
                stages: Json(vec![StageEntry {
                    stage: MATCHED_STAGE.to_string(),
                    entered_at: link.touched_at,
                }]),
                last_match_id: Some(link.match_id),
                created_at: link.touched_at,
                updated_at: link.touched_at,
            },
        };
        self.links.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction { state, results, links } = *self;
        let mut state = state.lock().expect("memory store poisoned");
        state.match_results.extend(results);
        for link in links {
            match state.job_candidates.iter_mut().find(|r| r.id == link.id) {
                Some(current) => *current = link,
                None => state.job_candidates.push(link),
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn MatchTransaction>, AppError> {
        self.lock().transactions_begun += 1;
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            results: Vec::new(),
            links: Vec::new(),
        }))
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn load_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Option<JobReq>, AppError> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .find(|j| j.req.id == job_id && j.req.tenant_id == tenant_id)
            .cloned())
    }

    async fn load_active_candidates(&self, tenant_id: Uuid) -> Result<Vec<Candidate>, AppError> {
        Ok(self
            .lock()
            .candidates
            .iter()
            .filter(|c| c.profile.tenant_id == tenant_id && c.profile.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn load_candidate(&self, tenant_id: Uuid, candidate_id: Uuid) -> Result<Option<Candidate>, AppError> {
        Ok(self
            .lock()
            .candidates
            .iter()
            .find(|c| {
                c.profile.id == candidate_id && c.profile.tenant_id == tenant_id && c.profile.deleted_at.is_none()
            })
            .cloned())
    }

    async fn load_engagement(
        &self,
        _tenant_id: Uuid,
        _candidate_ids: &[Uuid],
    ) -> Result<Vec<EngagementRow>, AppError> {
        Ok(Vec::new())
    }

    async fn latest_matches_for_job(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Vec<MatchResultRow>, AppError> {
        let state = self.lock();
        Ok(latest_per_candidate(
            state
                .match_results
                .iter()
                .filter(|m| m.tenant_id == tenant_id && m.job_req_id == job_id),
        ))
    }

    async fn mark_shortlisted(&self, match_id: Uuid, reason: &str) -> Result<(), AppError> {
        if let Some(row) = self.lock().match_results.iter_mut().find(|m| m.id == match_id) {
            row.shortlisted = true;
            row.shortlist_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn update_trust_score(&self, tenant_id: Uuid, candidate_id: Uuid, score: f64) -> Result<(), AppError> {
        let mut state = self.lock();
        let candidate = state
            .candidates
            .iter_mut()
            .find(|c| c.profile.id == candidate_id && c.profile.tenant_id == tenant_id)
            .ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))?;
        candidate.profile.trust_score = Some(score);
        Ok(())
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn latest_match_for(
        &self,
        tenant_id: Uuid,
        job_req_id: Uuid,
        candidate_id: Uuid,
    ) -> Result<Option<MatchResultRow>, AppError> {
        let state = self.lock();
        Ok(latest_per_candidate(state.match_results.iter().filter(|m| {
            m.tenant_id == tenant_id && m.job_req_id == job_req_id && m.candidate_id == candidate_id
        }))
        .pop())
    }

    async fn upsert_feedback(&self, new: NewMatchFeedback) -> Result<MatchFeedbackRow, AppError> {
        let mut state = self.lock();
        let existing = state.feedback.iter_mut().find(|f| {
            f.tenant_id == new.tenant_id
                && f.job_req_id == new.job_req_id
                && f.candidate_id == new.candidate_id
                && f.user_id == new.user_id
        });

        let row = MatchFeedbackRow {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            job_req_id: new.job_req_id,
            candidate_id: new.candidate_id,
            user_id: new.user_id,
            match_result_id: new.match_result_id,
            feedback: new.feedback.as_str().to_string(),
            notes: new.notes,
            signal_snapshot: new.signal_snapshot,
            guardrails_hash: new.guardrails_hash,
            system_mode: new.system_mode.as_str().to_string(),
            confidence_band: new.confidence_band.as_str().to_string(),
            created_at: new.recorded_at,
            updated_at: new.recorded_at,
        };

        match existing {
            Some(current) => {
                *current = MatchFeedbackRow {
                    id: current.id,
                    created_at: current.created_at,
                    ..row
                };
                Ok(current.clone())
            }
            None => {
                state.feedback.push(row.clone());
                Ok(row)
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cron
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl JobStateStore for MemoryStore {
    async fn find_job_state(&self, job_name: &str) -> Result<Option<AsyncJobStateRow>, AppError> {
        Ok(self.lock().job_states.get(job_name).cloned())
    }

    async fn create_job_state_if_absent(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
    ) -> Result<AsyncJobStateRow, AppError> {
        Ok(self
            .lock()
            .job_states
            .entry(job_name.to_string())
            .or_insert_with(|| AsyncJobStateRow {
                job_name: job_name.to_string(),
                status: JobStatus::Idle.as_str().to_string(),
                retries: 0,
                last_error: None,
                last_run_at: None,
                next_run_at: None,
                updated_at: now,
            })
            .clone())
    }

    async fn save_job_state(&self, state: &AsyncJobStateRow) -> Result<AsyncJobStateRow, AppError> {
        self.lock().job_states.insert(state.job_name.clone(), state.clone());
        Ok(state.clone())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record_audit(&self, event: AuditEvent) -> Result<(), AppError> {
        self.lock().audit_events.push(event);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Learning and market
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LearningStore for MemoryStore {
    async fn opted_in_tenants(&self) -> Result<Vec<Uuid>, AppError> {
        let mut tenants: Vec<Uuid> = self
            .lock()
            .tenant_configs
            .values()
            .filter(|c| c.network_learning_opt_in)
            .map(|c| c.tenant_id)
            .collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn load_learning_signals(
        &self,
        tenant_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<TenantLearningSignalRow>, AppError> {
        Ok(self
            .lock()
            .learning_signals
            .iter()
            .filter(|s| tenant_ids.contains(&s.tenant_id) && s.captured_at >= since)
            .cloned()
            .collect())
    }

    async fn replace_week_aggregates(
        &self,
        week_start: DateTime<Utc>,
        rows: &[LearningAggregateRow],
    ) -> Result<usize, AppError> {
        let mut state = self.lock();
        state.learning_aggregates.retain(|a| a.captured_at != week_start);
        state.learning_aggregates.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    async fn delete_learning_signals_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.lock();
        let before = state.learning_signals.len();
        state.learning_signals.retain(|s| s.captured_at >= cutoff);
        Ok((before - state.learning_signals.len()) as u64)
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn load_aggregates(
        &self,
        query: &AggregateQuery,
        bypass_cache: bool,
    ) -> Result<Vec<LearningAggregateRow>, AppError> {
        let mut state = self.lock();
        state.aggregate_loads += 1;
        state.last_aggregate_bypass = Some(bypass_cache);
        Ok(state
            .learning_aggregates
            .iter()
            .filter(|a| a.captured_at >= query.since)
            .filter(|a| query.role_family.as_deref().map_or(true, |r| a.role_family == r))
            .filter(|a| query.region.as_deref().map_or(true, |r| a.region == r))
            .cloned()
            .collect())
    }

    async fn latest_ete_snapshot(&self) -> Result<Option<EteIndexSnapshotRow>, AppError> {
        Ok(self
            .lock()
            .ete_snapshots
            .iter()
            .max_by_key(|s| s.computed_at)
            .cloned())
    }

    async fn latest_snapshot_other_than(&self, period: &str) -> Result<Option<EteIndexSnapshotRow>, AppError> {
        Ok(self
            .lock()
            .ete_snapshots
            .iter()
            .filter(|s| s.period != period)
            .max_by_key(|s| s.computed_at)
            .cloned())
    }

    async fn upsert_ete_snapshot(&self, row: &EteIndexSnapshotRow) -> Result<EteIndexSnapshotRow, AppError> {
        let mut state = self.lock();
        match state.ete_snapshots.iter_mut().find(|s| s.period == row.period) {
            Some(current) => {
                *current = EteIndexSnapshotRow {
                    id: current.id,
                    ..row.clone()
                };
                Ok(current.clone())
            }
            None => {
                state.ete_snapshots.push(row.clone());
                Ok(row.clone())
            }
        }
    }
}

#[async_trait]
impl ForecastStore for MemoryStore {
    async fn load_forecast_inputs(&self, tenant_id: Uuid) -> Result<Vec<JobForecastInput>, AppError> {
        let state = self.lock();
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.req.tenant_id == tenant_id && j.req.status == "open")
            .map(|job| {
                let job_id = job.req.id;
                let for_job: Vec<&MatchResultRow> = state
                    .match_results
                    .iter()
                    .filter(|m| m.tenant_id == tenant_id && m.job_req_id == job_id)
                    .collect();
                let matched: HashSet<Uuid> = for_job.iter().map(|m| m.candidate_id).collect();
                let shortlisted: HashSet<Uuid> = for_job
                    .iter()
                    .filter(|m| m.shortlisted)
                    .map(|m| m.candidate_id)
                    .collect();

                JobForecastInput {
                    job_id,
                    job_title: job.req.title.clone(),
                    opened_at: job.req.created_at,
                    matches: matched.len() as i64,
                    shortlisted: shortlisted.len() as i64,
                    stage_histories: state
                        .job_candidates
                        .iter()
                        .filter(|l| l.tenant_id == tenant_id && l.job_req_id == job_id)
                        .map(|l| l.stages.0.clone())
                        .collect(),
                    candidate_signal_scores: latest_per_candidate(for_job.into_iter())
                        .iter()
                        .map(|m| m.candidate_signal_score)
                        .collect(),
                }
            })
            .collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cache
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl SignalCache for MemoryCache {
    async fn get_cached(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.lock().expect("memory cache poisoned").get(key).cloned())
    }

    async fn put_cached(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<(), AppError> {
        self.entries
            .lock()
            .expect("memory cache poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
