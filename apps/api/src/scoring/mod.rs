// Scoring core: pure, deterministic scorers. No I/O in this module tree.
// Weight vectors are injected via `ScoringConfig`; the constants are only defaults.

pub mod confidence;
pub mod config;
pub mod match_score;
pub mod signals;

/// Clamps a raw score to [0, 100] and rounds it; non-finite input scores 0.
pub fn clamp_score(raw: f64) -> i32 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as i32
}

/// Lower-cases, trims and collapses inner whitespace so skill names compare reliably.
pub fn normalize_token(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
