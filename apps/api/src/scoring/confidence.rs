//! Candidate confidence: how much to trust a candidate profile, independent of any job.
//!
//! Blends three sub-scores (0–100 each):
//! - source quality: where the candidate came from
//! - agent consistency: the profile agent's own parsing confidence
//! - resume completeness: share of the tracked profile fields that are filled in

use serde::{Deserialize, Serialize};

use crate::models::candidate::Candidate;
use crate::scoring::clamp_score;
use crate::scoring::config::CandidateConfidenceWeights;

/// Score used when a candidate's source or parsing confidence is unknown.
const NEUTRAL_SCORE: f64 = 55.0;

const SOURCE_QUALITY: &[(&str, f64)] = &[
    ("referral", 95.0),
    ("internal", 90.0),
    ("inbound", 80.0),
    ("sourced", 75.0),
    ("outbound", 75.0),
    ("job_board", 70.0),
    ("agency", 65.0),
];

const TRACKED_FIELDS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub source_quality: SubScore,
    pub agent_consistency: SubScore,
    pub resume_completeness: SubScore,
    /// Effective (normalized) weights used for the blend.
    pub weights: CandidateConfidenceWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub score: i32,
    pub breakdown: ConfidenceBreakdown,
}

pub fn compute_candidate_confidence_score(
    candidate: &Candidate,
    weights: &CandidateConfidenceWeights,
) -> ConfidenceResult {
    let weights = weights.normalized();

    let source_quality = score_source_quality(
        candidate.profile.source_tag.as_deref(),
        candidate.profile.source_type.as_deref(),
    );
    let agent_consistency = score_agent_consistency(candidate.profile.parsing_confidence);
    let resume_completeness = score_resume_completeness(candidate);

    let raw = source_quality.score * weights.source_quality
        + agent_consistency.score * weights.agent_consistency
        + resume_completeness.score * weights.resume_completeness;

    ConfidenceResult {
        score: clamp_score(raw),
        breakdown: ConfidenceBreakdown {
            source_quality,
            agent_consistency,
            resume_completeness,
            weights,
        },
    }
}

fn normalize_source(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(|c: char| c == '-' || c.is_whitespace(), "_")
}

/// The tag is more specific than the type, so it is consulted first.
fn score_source_quality(tag: Option<&str>, source_type: Option<&str>) -> SubScore {
    let provided: Vec<String> = [tag, source_type]
        .into_iter()
        .flatten()
        .map(normalize_source)
        .filter(|s| !s.is_empty())
        .collect();

    for source in &provided {
        if let Some((_, score)) = SOURCE_QUALITY.iter().find(|(key, _)| *key == source.as_str()) {
            return SubScore {
                score: *score,
                reason: format!("Source '{source}' scores {score:.0}"),
            };
        }
    }

    let reason = match provided.first() {
        Some(source) => format!("Unrecognized source '{source}'; using neutral {NEUTRAL_SCORE:.0}"),
        None => format!("Source unspecified; using neutral {NEUTRAL_SCORE:.0}"),
    };
    SubScore {
        score: NEUTRAL_SCORE,
        reason,
    }
}

fn score_agent_consistency(parsing_confidence: Option<f64>) -> SubScore {
    match parsing_confidence.filter(|c| c.is_finite()) {
        Some(confidence) => {
            let score = (confidence.clamp(0.0, 1.0) * 100.0 * 10.0).round() / 10.0;
            SubScore {
                score,
                reason: format!("Profile agent parsing confidence {confidence:.2}"),
            }
        }
        None => SubScore {
            score: NEUTRAL_SCORE,
            reason: format!("No parsing confidence recorded; using neutral {NEUTRAL_SCORE:.0}"),
        },
    }
}

fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn score_resume_completeness(candidate: &Candidate) -> SubScore {
    let profile = &candidate.profile;
    let fields = [
        ("summary", is_filled(&profile.summary)),
        ("raw resume", is_filled(&profile.raw_resume)),
        ("location", is_filled(&profile.location)),
        ("title", is_filled(&profile.current_title)),
        ("email", is_filled(&profile.email)),
        ("phone", is_filled(&profile.phone)),
        ("skills", !candidate.skills.is_empty()),
    ];

    let present = fields.iter().filter(|(_, ok)| *ok).count();
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, ok)| !*ok)
        .map(|(name, _)| *name)
        .collect();

    let score = (present as f64 / TRACKED_FIELDS as f64 * 100.0 * 10.0).round() / 10.0;
    let reason = if missing.is_empty() {
        format!("All {TRACKED_FIELDS} tracked fields present")
    } else {
        format!(
            "{present}/{TRACKED_FIELDS} tracked fields present; missing: {}",
            missing.join(", ")
        )
    };

    SubScore { score, reason }
}
