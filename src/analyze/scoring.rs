//! Trend scoring.
//!
//! `combined = importance * importance_weight + ai_relevance * relevance_weight`
//! mapped onto High / Medium / Low by two thresholds. Inputs are clamped to [0,1].

use serde::Deserialize;

use crate::model::TrendLevel;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrendWeights {
    pub importance_weight: f32,
    pub relevance_weight: f32,
    pub high_threshold: f32,
    pub medium_threshold: f32,
}

impl Default for TrendWeights {
    fn default() -> Self {
        Self {
            importance_weight: 0.5,
            relevance_weight: 0.5,
            high_threshold: 0.8,
            medium_threshold: 0.5,
        }
    }
}

impl TrendWeights {
    /// Clamp everything into [0,1] and keep `high >= medium`.
    pub fn sanitized(self) -> Self {
        fn c(x: f32) -> f32 {
            if x.is_finite() {
                x.clamp(0.0, 1.0)
            } else {
                0.0
            }
        }
        let (hi, mid) = (c(self.high_threshold), c(self.medium_threshold));
        Self {
            importance_weight: c(self.importance_weight),
            relevance_weight: c(self.relevance_weight),
            high_threshold: hi.max(mid),
            medium_threshold: hi.min(mid),
        }
    }
}

pub fn combined_score(importance: f32, ai_relevance: f32, w: &TrendWeights) -> f32 {
    importance.clamp(0.0, 1.0) * w.importance_weight
        + ai_relevance.clamp(0.0, 1.0) * w.relevance_weight
}

pub fn trend_level(importance: f32, ai_relevance: f32, w: &TrendWeights) -> TrendLevel {
    let score = combined_score(importance, ai_relevance, w);
    if score >= w.high_threshold {
        TrendLevel::High
    } else if score >= w.medium_threshold {
        TrendLevel::Medium
    } else {
        TrendLevel::Low
    }
}
