//! # Candidate Metrics
//!
//! Per-freelancer signals supplied by the candidate metrics provider. How these
//! numbers are computed upstream is outside the engine; the engine only clamps
//! them into their documented ranges before scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::scoring::MAX_RATING;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMetrics {
    pub freelancer_id: i64,
    /// `None` when the freelancer has never been assigned
    pub last_assignment_at: Option<DateTime<Utc>>,
    /// 0–5
    pub rating: f64,
    /// 0–1
    pub completion_rate: f64,
    /// Recent earnings, non-negative
    pub earnings_balance: f64,
    pub active_assignment_count: u32,
    pub is_newcomer: bool,
}

impl CandidateMetrics {
    /// Clamp every numeric signal into range; non-finite values become 0.
    pub fn sanitized(mut self) -> Self {
        self.rating = clamp_finite(self.rating, 0.0, MAX_RATING);
        self.completion_rate = clamp_finite(self.completion_rate, 0.0, 1.0);
        self.earnings_balance = clamp_finite(self.earnings_balance, 0.0, f64::MAX);
        self
    }

    /// Whole days since the last assignment, `None` if never assigned.
    pub fn days_since_last_assignment(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_assignment_at.map(|at| {
            let seconds = (now - at).num_seconds().max(0) as f64;
            seconds / 86_400.0
        })
    }

    /// Whether the freelancer was assigned within the last `window_days`.
    pub fn assigned_within(&self, now: DateTime<Utc>, window_days: u32) -> bool {
        self.days_since_last_assignment(now)
            .is_some_and(|days| days < f64::from(window_days))
    }
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.0
    }
}
