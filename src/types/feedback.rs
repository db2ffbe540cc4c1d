//! Scoring results.

use serde::{Deserialize, Serialize};

/// Score given to personas whose evaluation failed.
pub const SENTINEL_SCORE: f64 = 0.0;

/// One persona's reaction to a marketing copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub persona_id: String,

    /// Purchase intent, nominally 1-10. `0` marks a failed evaluation.
    pub score: f64,

    #[serde(default)]
    pub reasons_to_buy: Vec<String>,

    #[serde(default)]
    pub reasons_not_to_buy: Vec<String>,

    /// Raw model text, or the failure cause for sentinel records.
    #[serde(default)]
    pub detail_feedback: String,
}

impl Feedback {
    /// Placeholder for a persona that could not be scored.
    pub fn failed(persona_id: impl Into<String>, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        Self {
            persona_id: persona_id.into(),
            score: SENTINEL_SCORE,
            reasons_to_buy: vec!["evaluation failed".to_string()],
            reasons_not_to_buy: vec![cause.clone()],
            detail_feedback: format!("evaluation failed: {}", cause),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.score <= SENTINEL_SCORE
    }
}

/// Result of scoring one copy against a set of personas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringReport {
    /// One record per requested persona, in request order.
    pub feedback: Vec<Feedback>,

    /// Mean of the positive scores; 0 when there are none.
    pub avg_score: f64,
}

impl ScoringReport {
    pub fn new(feedback: Vec<Feedback>) -> Self {
        let avg_score = average_positive(&feedback);
        Self {
            feedback,
            avg_score,
        }
    }

    /// Number of personas that fell back to a sentinel record.
    pub fn failed_count(&self) -> usize {
        self.feedback.iter().filter(|f| f.is_sentinel()).count()
    }
}

/// Arithmetic mean of all scores above zero.
pub fn average_positive(feedback: &[Feedback]) -> f64 {
    let positive: Vec<f64> = feedback
        .iter()
        .map(|f| f.score)
        .filter(|s| *s > SENTINEL_SCORE)
        .collect();
    if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<f64>() / positive.len() as f64
    }
}
