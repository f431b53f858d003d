use serde::{Deserialize, Serialize};

/// Weights for the four match sub-scores. Need not sum to 1; they are renormalized before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScoringWeights {
    pub skills: f64,
    pub seniority: f64,
    pub location: f64,
    pub candidate_signals: f64,
}

pub const MATCH_SCORING_WEIGHTS: MatchScoringWeights = MatchScoringWeights {
    skills: 0.40,
    seniority: 0.20,
    location: 0.15,
    candidate_signals: 0.25,
};

impl Default for MatchScoringWeights {
    fn default() -> Self {
        MATCH_SCORING_WEIGHTS
    }
}

impl MatchScoringWeights {
    /// Returns weights scaled to sum to 1. All-zero (or all-invalid) input stays all-zero.
    pub fn normalized(&self) -> Self {
        let [skills, seniority, location, candidate_signals] = normalize_weights([
            self.skills,
            self.seniority,
            self.location,
            self.candidate_signals,
        ]);
        Self {
            skills,
            seniority,
            location,
            candidate_signals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateConfidenceWeights {
    pub source_quality: f64,
    pub agent_consistency: f64,
    pub resume_completeness: f64,
}

pub const CANDIDATE_CONFIDENCE_WEIGHTS: CandidateConfidenceWeights = CandidateConfidenceWeights {
    source_quality: 0.35,
    agent_consistency: 0.35,
    resume_completeness: 0.30,
};

impl Default for CandidateConfidenceWeights {
    fn default() -> Self {
        CANDIDATE_CONFIDENCE_WEIGHTS
    }
}

impl CandidateConfidenceWeights {
    pub fn normalized(&self) -> Self {
        let [source_quality, agent_consistency, resume_completeness] = normalize_weights([
            self.source_quality,
            self.agent_consistency,
            self.resume_completeness,
        ]);
        Self {
            source_quality,
            agent_consistency,
            resume_completeness,
        }
    }
}

/// Scoring configuration threaded through every scorer call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub match_weights: MatchScoringWeights,
    #[serde(default)]
    pub confidence_weights: CandidateConfidenceWeights,
}

/// Scales a weight vector to sum to 1.
///
/// Negative and non-finite entries count as 0. If nothing positive remains the
/// result is all zeros, so a weighted sum over it is 0 rather than NaN.
pub fn normalize_weights<const N: usize>(raw: [f64; N]) -> [f64; N] {
    let cleaned = raw.map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });
    let total: f64 = cleaned.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return [0.0; N];
    }
    cleaned.map(|w| w / total)
}
