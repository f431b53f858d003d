//! Candidate-signal sub-score: what we know about the candidate beyond the resume itself.
//!
//! Blends the candidate confidence score with outreach engagement. The breakdown keeps the
//! full confidence result so downstream agents can read `confidence.score` back out.

use serde::{Deserialize, Serialize};

use crate::models::candidate::EngagementRow;
use crate::scoring::clamp_score;
use crate::scoring::confidence::ConfidenceResult;

const CONFIDENCE_SHARE: f64 = 0.6;
const ENGAGEMENT_SHARE: f64 = 0.4;
const NO_HISTORY_SCORE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub score: f64,
    pub interactions: i64,
    pub replies: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSignalBreakdown {
    pub score: i32,
    pub confidence: ConfidenceResult,
    pub engagement: EngagementSummary,
}

pub fn compute_candidate_signals(
    confidence: ConfidenceResult,
    engagement: Option<&EngagementRow>,
) -> CandidateSignalBreakdown {
    let engagement = score_engagement(engagement);
    let raw = confidence.score as f64 * CONFIDENCE_SHARE + engagement.score * ENGAGEMENT_SHARE;

    CandidateSignalBreakdown {
        score: clamp_score(raw),
        confidence,
        engagement,
    }
}

fn score_engagement(row: Option<&EngagementRow>) -> EngagementSummary {
    let (interactions, replies) = row
        .map(|r| (r.interactions.max(0), r.replies.max(0)))
        .unwrap_or((0, 0));

    if interactions == 0 {
        return EngagementSummary {
            score: NO_HISTORY_SCORE,
            interactions,
            replies,
            reason: "No outreach history".to_string(),
        };
    }

    let reply_rate = (replies as f64 / interactions as f64).clamp(0.0, 1.0);
    let score = ((30.0 + 70.0 * reply_rate) * 10.0).round() / 10.0;
    EngagementSummary {
        score,
        interactions,
        replies,
        reason: format!(
            "{replies} replies to {interactions} outreach touches ({:.0}% reply rate)",
            reply_rate * 100.0
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::confidence::{ConfidenceBreakdown, SubScore};
    use crate::scoring::config::CANDIDATE_CONFIDENCE_WEIGHTS;
    use uuid::Uuid;

    fn confidence(score: i32) -> ConfidenceResult {
        let sub = SubScore {
            score: score as f64,
            reason: String::new(),
        };
        ConfidenceResult {
            score,
            breakdown: ConfidenceBreakdown {
                source_quality: sub.clone(),
                agent_consistency: sub.clone(),
                resume_completeness: sub,
                weights: CANDIDATE_CONFIDENCE_WEIGHTS,
            },
        }
    }

    #[test]
    fn test_no_history_is_neutral() {
        let b = compute_candidate_signals(confidence(80), None);
        // 0.6*80 + 0.4*50
        assert_eq!(b.score, 68);
        assert_eq!(b.engagement.score, 50.0);
        assert_eq!(b.confidence.score, 80);
    }

    #[test]
    fn test_reply_rate_drives_engagement() {
        let row = EngagementRow {
            candidate_id: Uuid::new_v4(),
            interactions: 4,
            replies: 4,
            last_interaction_at: None,
        };
        let b = compute_candidate_signals(confidence(100), Some(&row));
        assert_eq!(b.engagement.score, 100.0);
        assert_eq!(b.score, 100);

        let cold = EngagementRow {
            replies: 0,
            ..row
        };
        let b = compute_candidate_signals(confidence(100), Some(&cold));
        assert_eq!(b.engagement.score, 30.0);
        assert_eq!(b.score, 72);
    }

    #[test]
    fn test_replies_above_interactions_are_capped() {
        let row = EngagementRow {
            candidate_id: Uuid::new_v4(),
            interactions: 1,
            replies: 9,
            last_interaction_at: None,
        };
        let b = compute_candidate_signals(confidence(0), Some(&row));
        assert_eq!(b.engagement.score, 100.0);
    }
}
