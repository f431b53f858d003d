//! Match scoring of a candidate against a job requisition.
//!
//! Algorithm:
//! 1. skills: weighted share of the job's skills present in the candidate's normalized
//!    skill set (required skills weigh double preferred ones)
//! 2. seniority: ordinal distance on the level ladder (exact 100, one level off 60, else 0)
//! 3. location: exact or same-region 100, remote on either side 75, otherwise 0
//! 4. candidate signals: precomputed by `scoring::signals`
//! 5. score = clamp(round(Σ sub_score × normalized_weight), 0, 100)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::candidate::Candidate;
use crate::models::job::JobReq;
use crate::models::tenant::Guardrails;
use crate::scoring::config::MatchScoringWeights;
use crate::scoring::signals::CandidateSignalBreakdown;
use crate::scoring::{clamp_score, normalize_token};

/// Used whenever one side of a comparison carries no data.
const UNKNOWN_SCORE: f64 = 50.0;
const PREFERRED_SKILL_FACTOR: f64 = 0.5;
const ADJACENT_SENIORITY_SCORE: f64 = 60.0;
const REMOTE_LOCATION_SCORE: f64 = 75.0;

/// Ordered seniority ladder. Each rung lists the whole words that map onto it.
const SENIORITY_LADDER: &[&[&str]] = &[
    &["intern"],
    &["junior", "entry", "associate", "graduate"],
    &["mid", "intermediate"],
    &["senior"],
    &["staff", "lead"],
    &["principal", "architect", "distinguished"],
    &["director", "head", "vp", "chief"],
];

/// Structured explanation persisted as `match_results.reasons`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReasons {
    pub matched_skills: Vec<String>,
    /// Display names of required skills the candidate lacks.
    pub missing_skills: Vec<String>,
    pub missing_preferred_skills: Vec<String>,
    pub seniority: String,
    pub location: String,
    pub weights: MatchScoringWeights,
    pub confidence_score: i32,
    /// Guardrails in force when the match was computed; filled in by the batch matcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<Guardrails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub score: i32,
    pub skill_score: i32,
    pub seniority_score: i32,
    pub location_score: i32,
    pub candidate_signal_score: i32,
    pub candidate_signal_breakdown: CandidateSignalBreakdown,
    pub reasons: MatchReasons,
}

pub fn compute_match_score(
    candidate: &Candidate,
    job: &JobReq,
    signals: &CandidateSignalBreakdown,
    weights: &MatchScoringWeights,
) -> MatchScore {
    let weights = weights.normalized();

    let skills = score_skills(candidate, job);
    let (seniority_score, seniority_reason) = score_seniority(
        candidate.profile.seniority.as_deref(),
        job.req.seniority.as_deref(),
    );
    let (location_score, location_reason) =
        score_location(candidate.profile.location.as_deref(), job.req.location.as_deref());
    let signal_score = signals.score as f64;

    let raw = skills.score * weights.skills
        + seniority_score * weights.seniority
        + location_score * weights.location
        + signal_score * weights.candidate_signals;

    MatchScore {
        score: clamp_score(raw),
        skill_score: clamp_score(skills.score),
        seniority_score: clamp_score(seniority_score),
        location_score: clamp_score(location_score),
        candidate_signal_score: clamp_score(signal_score),
        candidate_signal_breakdown: signals.clone(),
        reasons: MatchReasons {
            matched_skills: skills.matched,
            missing_skills: skills.missing_required,
            missing_preferred_skills: skills.missing_preferred,
            seniority: seniority_reason,
            location: location_reason,
            weights,
            confidence_score: signals.confidence.score,
            guardrails: None,
        },
    }
}

struct SkillEvaluation {
    score: f64,
    matched: Vec<String>,
    missing_required: Vec<String>,
    missing_preferred: Vec<String>,
}

fn score_skills(candidate: &Candidate, job: &JobReq) -> SkillEvaluation {
    let candidate_skills: HashSet<String> = candidate
        .skills
        .iter()
        .map(|s| {
            if s.normalized_name.trim().is_empty() {
                normalize_token(&s.name)
            } else {
                normalize_token(&s.normalized_name)
            }
        })
        .collect();

    let mut evaluation = SkillEvaluation {
        score: UNKNOWN_SCORE,
        matched: Vec::new(),
        missing_required: Vec::new(),
        missing_preferred: Vec::new(),
    };

    if job.skills.is_empty() {
        return evaluation;
    }

    let mut total = 0.0_f64;
    let mut hit = 0.0_f64;

    for skill in &job.skills {
        let key = if skill.normalized_name.trim().is_empty() {
            normalize_token(&skill.name)
        } else {
            normalize_token(&skill.normalized_name)
        };
        let base = skill
            .weight
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(1.0);
        let weight = if skill.required {
            base
        } else {
            base * PREFERRED_SKILL_FACTOR
        };
        total += weight;

        if candidate_skills.contains(&key) {
            hit += weight;
            evaluation.matched.push(skill.name.clone());
        } else if skill.required {
            evaluation.missing_required.push(skill.name.clone());
        } else {
            evaluation.missing_preferred.push(skill.name.clone());
        }
    }

    evaluation.score = if total > 0.0 { hit / total * 100.0 } else { 0.0 };
    evaluation
}

/// Highest rung named by any word of the title ("Senior Staff Engineer" is staff).
fn seniority_level(raw: &str) -> Option<usize> {
    let normalized = normalize_token(raw);
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .filter_map(|word| SENIORITY_LADDER.iter().position(|rung| rung.contains(&word)))
        .max()
}

fn score_seniority(candidate: Option<&str>, job: Option<&str>) -> (f64, String) {
    match (candidate.and_then(seniority_level), job.and_then(seniority_level)) {
        (Some(c), Some(j)) => {
            let distance = c.abs_diff(j);
            match distance {
                0 => (100.0, "Seniority matches".to_string()),
                1 => (
                    ADJACENT_SENIORITY_SCORE,
                    "Seniority one level off".to_string(),
                ),
                _ => (0.0, format!("Seniority {distance} levels apart")),
            }
        }
        _ => (UNKNOWN_SCORE, "Seniority unknown".to_string()),
    }
}

fn region_of(location: &str) -> &str {
    location.rsplit(',').next().unwrap_or(location).trim()
}

fn score_location(candidate: Option<&str>, job: Option<&str>) -> (f64, String) {
    let candidate = candidate.map(normalize_token).filter(|s| !s.is_empty());
    let job = job.map(normalize_token).filter(|s| !s.is_empty());

    let (Some(candidate), Some(job)) = (candidate, job) else {
        return (UNKNOWN_SCORE, "Location unknown".to_string());
    };

    if candidate == job {
        return (100.0, "Same location".to_string());
    }
    if job.contains("remote") || candidate.contains("remote") {
        return (REMOTE_LOCATION_SCORE, "Remote-compatible".to_string());
    }
    if candidate.contains(',') && job.contains(',') && region_of(&candidate) == region_of(&job) {
        return (100.0, "Same region".to_string());
    }
    (0.0, "Location mismatch".to_string())
}
