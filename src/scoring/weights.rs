//! Factor weights with a closed key set.
//!
//! Callers supply a partial map that is merged over [`ScoringWeights::default`].
//! Unknown keys are rejected rather than ignored, and every weight must be a
//! finite, non-negative number. Weights need not sum to one; the scorer
//! normalizes by their total.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::constants::scoring::{
    DEFAULT_COMPLETION_WEIGHT, DEFAULT_EARNINGS_WEIGHT, DEFAULT_INCLUSION_WEIGHT,
    DEFAULT_RATING_WEIGHT, DEFAULT_RECENCY_WEIGHT, MAX_WEIGHT,
};
use crate::error::{AutoAssignError, Result};

/// Scoring factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeightFactor {
    Recency,
    Rating,
    CompletionQuality,
    EarningsBalance,
    Inclusion,
}

impl WeightFactor {
    pub const ALL: &'static [WeightFactor] = &[
        Self::Recency,
        Self::Rating,
        Self::CompletionQuality,
        Self::EarningsBalance,
        Self::Inclusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recency => "recency",
            Self::Rating => "rating",
            Self::CompletionQuality => "completionQuality",
            Self::EarningsBalance => "earningsBalance",
            Self::Inclusion => "inclusion",
        }
    }
}

impl fmt::Display for WeightFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WeightFactor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|factor| factor.as_str() == s)
            .ok_or_else(|| format!("Unknown weight key: {s}"))
    }
}

/// Complete weight set snapshotted onto every queue entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ScoringWeights {
    pub recency: f64,
    pub rating: f64,
    #[serde(alias = "completion_quality")]
    pub completion_quality: f64,
    #[serde(alias = "earnings_balance")]
    pub earnings_balance: f64,
    pub inclusion: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: DEFAULT_RECENCY_WEIGHT,
            rating: DEFAULT_RATING_WEIGHT,
            completion_quality: DEFAULT_COMPLETION_WEIGHT,
            earnings_balance: DEFAULT_EARNINGS_WEIGHT,
            inclusion: DEFAULT_INCLUSION_WEIGHT,
        }
    }
}

impl ScoringWeights {
    /// All factors at zero; combine with [`ScoringWeights::with`] to build sparse sets.
    pub fn zero() -> Self {
        Self {
            recency: 0.0,
            rating: 0.0,
            completion_quality: 0.0,
            earnings_balance: 0.0,
            inclusion: 0.0,
        }
    }

    pub fn get(&self, factor: WeightFactor) -> f64 {
        match factor {
            WeightFactor::Recency => self.recency,
            WeightFactor::Rating => self.rating,
            WeightFactor::CompletionQuality => self.completion_quality,
            WeightFactor::EarningsBalance => self.earnings_balance,
            WeightFactor::Inclusion => self.inclusion,
        }
    }

    pub fn with(mut self, factor: WeightFactor, value: f64) -> Self {
        match factor {
            WeightFactor::Recency => self.recency = value,
            WeightFactor::Rating => self.rating = value,
            WeightFactor::CompletionQuality => self.completion_quality = value,
            WeightFactor::EarningsBalance => self.earnings_balance = value,
            WeightFactor::Inclusion => self.inclusion = value,
        }
        self
    }

    pub fn total(&self) -> f64 {
        WeightFactor::ALL.iter().map(|factor| self.get(*factor)).sum()
    }

    /// Reject negative or non-finite weights.
    pub fn validate(&self) -> Result<()> {
        for factor in WeightFactor::ALL {
            validate_weight(*factor, self.get(*factor))?;
        }
        Ok(())
    }

    /// Merge a partial override on top of this weight set.
    pub fn merged(&self, overrides: &PartialWeights) -> Self {
        let mut merged = *self;
        for factor in WeightFactor::ALL {
            if let Some(value) = overrides.get(*factor) {
                merged = merged.with(*factor, value);
            }
        }
        merged
    }
}

/// Partial weight map as supplied by callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartialWeights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earnings_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclusion: Option<f64>,
}

impl PartialWeights {
    pub fn get(&self, factor: WeightFactor) -> Option<f64> {
        match factor {
            WeightFactor::Recency => self.recency,
            WeightFactor::Rating => self.rating,
            WeightFactor::CompletionQuality => self.completion_quality,
            WeightFactor::EarningsBalance => self.earnings_balance,
            WeightFactor::Inclusion => self.inclusion,
        }
    }

    pub fn set(&mut self, factor: WeightFactor, value: f64) {
        let slot = match factor {
            WeightFactor::Recency => &mut self.recency,
            WeightFactor::Rating => &mut self.rating,
            WeightFactor::CompletionQuality => &mut self.completion_quality,
            WeightFactor::EarningsBalance => &mut self.earnings_balance,
            WeightFactor::Inclusion => &mut self.inclusion,
        };
        *slot = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        WeightFactor::ALL.iter().all(|factor| self.get(*factor).is_none())
    }

    /// Parse a JSON object, rejecting unknown keys and out-of-range values.
    ///
    /// Weights above [`MAX_WEIGHT`] are clamped.
    pub fn from_json_map(map: &Map<String, Value>) -> Result<Self> {
        let mut weights = Self::default();
        for (key, value) in map {
            let factor: WeightFactor = key.parse().map_err(AutoAssignError::Validation)?;
            let number = value.as_f64().ok_or_else(|| {
                AutoAssignError::validation(format!("Weight '{key}' must be a number"))
            })?;
            validate_weight(factor, number)?;
            weights.set(factor, number.min(MAX_WEIGHT));
        }
        Ok(weights)
    }
}

fn validate_weight(factor: WeightFactor, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AutoAssignError::validation(format!(
            "Weight '{factor}' must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}
