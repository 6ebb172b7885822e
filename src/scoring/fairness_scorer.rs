//! # Fairness Scorer
//!
//! Pure scoring of one candidate against a weight set.
//!
//! Each factor is mapped independently to a 0–100 sub-score:
//!
//! - **recency**: days since the last assignment, capped at the recency window
//!   and scaled to 0–100. Never-assigned candidates score 100.
//! - **rating**: linear from 0–5 to 0–100.
//! - **completionQuality**: completion rate as a percentage.
//! - **earningsBalance**: `100 * (1 - min(balance, cap) / cap)`, so candidates
//!   with lower recent earnings score higher.
//! - **inclusion**: 100 for newcomers and for candidates below the
//!   active-assignment threshold, 0 otherwise.
//!
//! Sub-scores are combined with weights normalized by their total and the
//! result is rounded to four decimals. A zero weight total yields
//! [`NEUTRAL_SCORE`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::weights::{ScoringWeights, WeightFactor};
use crate::constants::builder::DEFAULT_WINDOW_DAYS;
use crate::constants::scoring::{
    DEFAULT_EARNINGS_CAP, DEFAULT_INCLUSION_THRESHOLD, MAX_RATING, MAX_SCORE, NEUTRAL_SCORE,
    SCORE_DECIMALS,
};
use crate::error::Result;
use crate::models::CandidateMetrics;

/// Tunables that shape the per-factor sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    pub recency_window_days: u32,
    pub earnings_cap: f64,
    pub inclusion_threshold: u32,
    pub neutral_score: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            recency_window_days: DEFAULT_WINDOW_DAYS,
            earnings_cap: DEFAULT_EARNINGS_CAP,
            inclusion_threshold: DEFAULT_INCLUSION_THRESHOLD,
            neutral_score: NEUTRAL_SCORE,
        }
    }
}

/// Unweighted sub-scores plus the raw signals they came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub recency_score: f64,
    pub rating_score: f64,
    pub completion_score: f64,
    pub earnings_score: f64,
    pub inclusion_score: f64,
    pub days_since_last_assignment: Option<f64>,
    pub rating: f64,
    pub completion_rate: f64,
    pub earnings_balance: f64,
    pub active_assignment_count: u32,
    pub is_newcomer: bool,
    /// Set when the zero-weight fallback produced the score
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub neutral_fallback: bool,
}

impl ScoreBreakdown {
    pub fn sub_score(&self, factor: WeightFactor) -> f64 {
        match factor {
            WeightFactor::Recency => self.recency_score,
            WeightFactor::Rating => self.rating_score,
            WeightFactor::CompletionQuality => self.completion_score,
            WeightFactor::EarningsBalance => self.earnings_score,
            WeightFactor::Inclusion => self.inclusion_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Candidate paired with its score, ready for ranking
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub metrics: CandidateMetrics,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Default)]
pub struct FairnessScorer {
    params: ScoringParams,
}

impl FairnessScorer {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    /// Copy of this scorer with a different recency window.
    pub fn with_recency_window(&self, days: u32) -> Self {
        Self {
            params: ScoringParams {
                recency_window_days: days,
                ..self.params
            },
        }
    }

    /// Score one candidate. Fails only for invalid weights.
    pub fn score(
        &self,
        metrics: &CandidateMetrics,
        weights: &ScoringWeights,
        now: DateTime<Utc>,
    ) -> Result<ScoreOutcome> {
        weights.validate()?;

        let days = metrics.days_since_last_assignment(now);
        let mut breakdown = ScoreBreakdown {
            recency_score: self.recency_score(days),
            rating_score: clamp_score(metrics.rating / MAX_RATING * MAX_SCORE),
            completion_score: clamp_score(metrics.completion_rate * MAX_SCORE),
            earnings_score: self.earnings_score(metrics.earnings_balance),
            inclusion_score: self.inclusion_score(metrics),
            days_since_last_assignment: days.map(round_score),
            rating: metrics.rating,
            completion_rate: metrics.completion_rate,
            earnings_balance: metrics.earnings_balance,
            active_assignment_count: metrics.active_assignment_count,
            is_newcomer: metrics.is_newcomer,
            neutral_fallback: false,
        };

        let total = weights.total();
        if total <= 0.0 {
            breakdown.neutral_fallback = true;
            return Ok(ScoreOutcome {
                score: round_score(self.params.neutral_score),
                breakdown,
            });
        }

        let weighted: f64 = WeightFactor::ALL
            .iter()
            .map(|factor| weights.get(*factor) * breakdown.sub_score(*factor))
            .sum();

        Ok(ScoreOutcome {
            score: round_score(clamp_score(weighted / total)),
            breakdown,
        })
    }

    /// Score every candidate in input order.
    pub fn score_all(
        &self,
        candidates: Vec<CandidateMetrics>,
        weights: &ScoringWeights,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredCandidate>> {
        candidates
            .into_iter()
            .map(|metrics| {
                let outcome = self.score(&metrics, weights, now)?;
                Ok(ScoredCandidate {
                    metrics,
                    score: outcome.score,
                    breakdown: outcome.breakdown,
                })
            })
            .collect()
    }

    fn recency_score(&self, days: Option<f64>) -> f64 {
        let window = f64::from(self.params.recency_window_days.max(1));
        match days {
            None => MAX_SCORE,
            Some(days) => clamp_score(days.min(window) / window * MAX_SCORE),
        }
    }

    fn earnings_score(&self, balance: f64) -> f64 {
        if self.params.earnings_cap <= 0.0 {
            return MAX_SCORE;
        }
        let ratio = balance.clamp(0.0, self.params.earnings_cap) / self.params.earnings_cap;
        clamp_score((1.0 - ratio) * MAX_SCORE)
    }

    fn inclusion_score(&self, metrics: &CandidateMetrics) -> f64 {
        if metrics.is_newcomer || metrics.active_assignment_count < self.params.inclusion_threshold {
            MAX_SCORE
        } else {
            0.0
        }
    }
}

/// Ranking order: score descending, then (optionally) newcomers first, then
/// longest idle, then freelancer id ascending.
pub fn compare_candidates(
    a: &ScoredCandidate,
    b: &ScoredCandidate,
    newcomer_first: bool,
) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            if newcomer_first {
                b.metrics.is_newcomer.cmp(&a.metrics.is_newcomer)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| {
            match (a.metrics.last_assignment_at, b.metrics.last_assignment_at) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(&y),
            }
        })
        .then_with(|| a.metrics.freelancer_id.cmp(&b.metrics.freelancer_id))
}

pub fn round_score(value: f64) -> f64 {
    let factor = 10f64.powi(SCORE_DECIMALS);
    (value * factor).round() / factor
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}
