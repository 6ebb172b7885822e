//! # Queue Velocity
//!
//! Aggregate throughput metrics over a configurable lookback window.
//!
//! Each metric distinguishes "nothing happened in the window"
//! ([`MetricValue::NoSamples`]) from "too little happened to be meaningful"
//! ([`MetricValue::InsufficientData`]) instead of reporting zero for both.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::VelocitySettings;
use crate::error::{AutoAssignError, Result};
use crate::models::{QueueEntry, TargetRef};
use crate::state_machine::EntryStatus;
use crate::store::QueueStore;
use crate::utils::SharedClock;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MetricValue {
    NoSamples,
    InsufficientData { samples: usize, required: usize },
    Value { value: f64, samples: usize },
}

impl MetricValue {
    fn from_samples(samples: usize, required: usize, compute: impl FnOnce() -> f64) -> Self {
        if samples == 0 {
            Self::NoSamples
        } else if samples < required {
            Self::InsufficientData { samples, required }
        } else {
            Self::Value {
                value: compute(),
                samples,
            }
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value { value, .. } => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueVelocity {
    pub target: Option<TargetRef>,
    pub lookback_days: u32,
    /// Seconds from invitation to accept/decline
    pub median_response_seconds: MetricValue,
    /// Accepted share of invitations that were answered or lapsed
    pub acceptance_rate: MetricValue,
    /// Completed share of accepted invitations
    pub completion_rate: MetricValue,
}

#[derive(Debug, Clone)]
pub struct QueueVelocityService {
    store: Arc<dyn QueueStore>,
    clock: SharedClock,
    settings: VelocitySettings,
}

impl QueueVelocityService {
    pub fn new(store: Arc<dyn QueueStore>, clock: SharedClock, settings: VelocitySettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Velocity for one target, or across all targets when `target` is `None`.
    pub async fn velocity(&self, target: Option<TargetRef>) -> Result<QueueVelocity> {
        let since = self.clock.now() - ChronoDuration::days(i64::from(self.settings.lookback_days));
        let resolved = self
            .store
            .resolved_since(target, since)
            .await
            .map_err(AutoAssignError::from)?;
        Ok(summarize(target, &resolved, &self.settings))
    }
}

/// Compute velocity metrics from entries resolved within the window.
pub fn summarize(
    target: Option<TargetRef>,
    resolved: &[QueueEntry],
    settings: &VelocitySettings,
) -> QueueVelocity {
    let required = settings.min_samples.max(1);

    let mut response_seconds: Vec<f64> = resolved
        .iter()
        .filter(|entry| {
            matches!(
                entry.status,
                EntryStatus::Accepted | EntryStatus::Declined | EntryStatus::Completed
            )
        })
        .filter_map(QueueEntry::response_time)
        .map(|elapsed| elapsed.num_milliseconds().max(0) as f64 / 1000.0)
        .collect();
    response_seconds.sort_by(f64::total_cmp);

    let accepted = count(resolved, &[EntryStatus::Accepted, EntryStatus::Completed]);
    let invitations = count(
        resolved,
        &[
            EntryStatus::Accepted,
            EntryStatus::Completed,
            EntryStatus::Declined,
            EntryStatus::Expired,
        ],
    );
    let completed = count(resolved, &[EntryStatus::Completed]);

    QueueVelocity {
        target,
        lookback_days: settings.lookback_days,
        median_response_seconds: MetricValue::from_samples(response_seconds.len(), required, || {
            median(&response_seconds)
        }),
        acceptance_rate: MetricValue::from_samples(invitations, required, || {
            accepted as f64 / invitations as f64
        }),
        completion_rate: MetricValue::from_samples(accepted, required, || {
            completed as f64 / accepted as f64
        }),
    }
}

fn count(entries: &[QueueEntry], statuses: &[EntryStatus]) -> usize {
    entries
        .iter()
        .filter(|entry| statuses.contains(&entry.status))
        .count()
}

/// Median of a sorted, non-empty slice
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
