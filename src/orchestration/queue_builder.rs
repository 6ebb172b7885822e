//! # Queue Builder
//!
//! Selects and ranks a bounded set of candidates for one target.
//!
//! ## Algorithm
//!
//! 1. Fetch eligible candidates from the metrics provider
//! 2. Drop duplicate freelancer ids and clamp every signal into range
//! 3. Score every candidate with the merged weights
//! 4. When `fairness.ensure_newcomer` is set, pull the best eligible newcomer
//!    out of the ranking and pin it to position 1 with `priority_bucket = 1`
//! 5. Sort the rest by score with the deterministic tie-break
//! 6. Truncate to `limit` and number positions from 1
//!
//! The builder never touches the store. Identical candidates and config always
//! produce identical drafts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::{AutoAssignConfig, BuilderSettings};
use crate::constants::builder::{
    DEFAULT_ENSURE_NEWCOMER, DEFAULT_MAX_ASSIGNMENTS, DEFAULT_WINDOW_DAYS,
    MAX_EXPIRES_IN_MINUTES, NEWCOMER_PRIORITY_BUCKET,
};
use crate::error::{AutoAssignError, Result};
use crate::models::{CandidateMetrics, Metadata, NewQueueEntry, TargetRef};
use crate::providers::CandidateMetricsProvider;
use crate::scoring::{compare_candidates, FairnessScorer, PartialWeights, ScoredCandidate, ScoringWeights};

/// Metadata key set on the entry occupying the reserved newcomer slot
pub const ENSURED_NEWCOMER_KEY: &str = "ensuredNewcomer";

/// Newcomer reservation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FairnessConfig {
    #[serde(alias = "ensure_newcomer")]
    pub ensure_newcomer: bool,
    /// Newcomers with more active assignments than this cannot take the reserved slot
    #[serde(alias = "max_assignments")]
    pub max_assignments: u32,
    /// Newcomers assigned within this many days cannot take the reserved slot
    #[serde(alias = "window_days")]
    pub window_days: u32,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            ensure_newcomer: DEFAULT_ENSURE_NEWCOMER,
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl FairnessConfig {
    /// Whether `candidate` may occupy the reserved slot at `now`.
    pub fn is_reservation_eligible(&self, candidate: &CandidateMetrics, now: DateTime<Utc>) -> bool {
        candidate.is_newcomer
            && candidate.active_assignment_count <= self.max_assignments
            && !candidate.assigned_within(now, self.window_days)
    }
}

/// Per-request builder configuration (the enqueue body, after validation)
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    pub limit: u32,
    pub expires_in_minutes: u32,
    /// Overrides merged over the configured default weights
    pub weights: PartialWeights,
    pub fairness: FairnessConfig,
    pub project_value: Option<f64>,
    pub metadata: Metadata,
}

impl BuilderConfig {
    /// Request that uses every configured default
    pub fn from_settings(settings: &BuilderSettings) -> Self {
        Self {
            limit: settings.limit,
            expires_in_minutes: settings.expires_in_minutes,
            weights: PartialWeights::default(),
            fairness: settings.fairness.clone(),
            project_value: None,
            metadata: Metadata::new(),
        }
    }

    pub fn validate(&self, max_limit: u32) -> Result<()> {
        if self.limit == 0 || self.limit > max_limit {
            return Err(AutoAssignError::validation(format!(
                "limit must be between 1 and {max_limit}, got {}",
                self.limit
            )));
        }
        if self.expires_in_minutes == 0 || self.expires_in_minutes > MAX_EXPIRES_IN_MINUTES {
            return Err(AutoAssignError::validation(format!(
                "expiresInMinutes must be between 1 and {MAX_EXPIRES_IN_MINUTES}, got {}",
                self.expires_in_minutes
            )));
        }
        if let Some(value) = self.project_value {
            if !value.is_finite() || value < 0.0 {
                return Err(AutoAssignError::validation(format!(
                    "projectValue must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Ranked, unpersisted queue for one target
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQueue {
    pub target: TargetRef,
    pub drafts: Vec<NewQueueEntry>,
    /// Full weight set the scores were computed with
    pub weights: ScoringWeights,
    pub candidates_considered: usize,
    pub reserved_newcomer: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct QueueBuilder {
    scorer: FairnessScorer,
    default_weights: ScoringWeights,
    max_limit: u32,
}

impl QueueBuilder {
    pub fn new(scorer: FairnessScorer, default_weights: ScoringWeights, max_limit: u32) -> Self {
        Self {
            scorer,
            default_weights,
            max_limit,
        }
    }

    pub fn from_config(config: &AutoAssignConfig) -> Self {
        Self::new(
            FairnessScorer::new(config.scoring),
            config.builder.weights,
            config.builder.max_limit,
        )
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Fetch candidates for `target` and rank them.
    pub async fn build_queue(
        &self,
        provider: &dyn CandidateMetricsProvider,
        target: TargetRef,
        config: &BuilderConfig,
        now: DateTime<Utc>,
    ) -> Result<BuiltQueue> {
        config.validate(self.max_limit)?;
        let candidates = provider.get_eligible_candidates(target).await?;
        self.rank_candidates(target, candidates, config, now)
    }

    /// Rank already-fetched candidates. Pure and deterministic.
    pub fn rank_candidates(
        &self,
        target: TargetRef,
        candidates: Vec<CandidateMetrics>,
        config: &BuilderConfig,
        now: DateTime<Utc>,
    ) -> Result<BuiltQueue> {
        config.validate(self.max_limit)?;
        let weights = self.default_weights.merged(&config.weights);
        weights.validate()?;

        let candidates = dedupe(candidates);
        let candidates_considered = candidates.len();
        let mut scored = self.scorer.score_all(candidates, &weights, now)?;

        let reserved = if config.fairness.ensure_newcomer {
            take_reserved_newcomer(&mut scored, &config.fairness, now)
        } else {
            None
        };

        scored.sort_by(|a, b| compare_candidates(a, b, config.fairness.ensure_newcomer));

        let limit = config.limit as usize;
        let reserved_newcomer = reserved.as_ref().map(|c| c.metrics.freelancer_id);
        let ranked = reserved
            .into_iter()
            .map(|candidate| (candidate, true))
            .chain(scored.into_iter().map(|candidate| (candidate, false)))
            .take(limit);

        let drafts: Vec<NewQueueEntry> = ranked
            .enumerate()
            .map(|(index, (candidate, is_reserved))| {
                let mut metadata = config.metadata.clone();
                if is_reserved {
                    metadata.insert(ENSURED_NEWCOMER_KEY.to_string(), Value::Bool(true));
                }
                NewQueueEntry {
                    target_id: target.target_id,
                    target_type: target.target_type,
                    freelancer_id: candidate.metrics.freelancer_id,
                    position: (index + 1) as i32,
                    score: candidate.score,
                    priority_bucket: is_reserved.then_some(NEWCOMER_PRIORITY_BUCKET),
                    weights,
                    breakdown: candidate.breakdown,
                    project_value: config.project_value,
                    metadata,
                    invitation_ttl_minutes: config.expires_in_minutes,
                }
            })
            .collect();

        debug!(
            queue = %target,
            candidates = candidates_considered,
            ranked = drafts.len(),
            reserved_newcomer = ?reserved_newcomer,
            "Built ranked queue"
        );

        Ok(BuiltQueue {
            target,
            drafts,
            weights,
            candidates_considered,
            reserved_newcomer,
        })
    }
}

/// Keep the first occurrence of every freelancer id and sanitize signals.
fn dedupe(candidates: Vec<CandidateMetrics>) -> Vec<CandidateMetrics> {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut unique = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if seen.insert(candidate.freelancer_id) {
            unique.push(candidate.sanitized());
        } else {
            warn!(
                freelancer_id = candidate.freelancer_id,
                "Provider returned duplicate candidate; keeping first occurrence"
            );
        }
    }
    unique
}

fn take_reserved_newcomer(
    scored: &mut Vec<ScoredCandidate>,
    fairness: &FairnessConfig,
    now: DateTime<Utc>,
) -> Option<ScoredCandidate> {
    let best = scored
        .iter()
        .enumerate()
        .filter(|(_, c)| fairness.is_reservation_eligible(&c.metrics, now))
        .min_by(|(_, a), (_, b)| compare_candidates(a, b, true))
        .map(|(index, _)| index)?;
    Some(scored.remove(best))
}
