//! # Queue Entry Model
//!
//! One candidate's ranked invitation slot for a target.
//!
//! ## Overview
//!
//! Entries are created in bulk by the queue builder as [`NewQueueEntry`] drafts,
//! persisted by a [`QueueStore`](crate::store::QueueStore) which assigns the id,
//! generation and timestamps, and are then mutated one at a time by the
//! invitation lifecycle manager or the expiry sweep. Entries are never deleted:
//! terminal rows are retained for audit and fairness-window calculations.
//!
//! ## Versioning
//!
//! Every write bumps `version`. Conditional updates are keyed on
//! `(id, status, version)` so a response racing the expiry sweep can never be
//! applied on top of a stale image.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::target::{TargetRef, TargetType};
use crate::scoring::{ScoreBreakdown, ScoringWeights};
use crate::state_machine::EntryStatus;

/// Free-form auxiliary data; never used for control flow
pub type Metadata = Map<String, Value>;

/// Freelancer (or operator) response recorded when an entry is actioned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_label: Option<String>,
    /// 0–5 rating supplied on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persisted queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: i64,
    pub target_id: i64,
    pub target_type: TargetType,
    pub freelancer_id: i64,
    /// Regeneration counter of the target at creation time
    pub generation: i64,
    /// 1-based rank within `(target, generation)`
    pub position: i32,
    pub status: EntryStatus,
    pub score: f64,
    pub priority_bucket: Option<i32>,
    pub weights: ScoringWeights,
    pub breakdown: ScoreBreakdown,
    pub project_value: Option<f64>,
    pub metadata: Metadata,
    pub response: Option<EntryResponse>,
    pub invitation_ttl_minutes: u32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the invitation was sent; kept after the entry resolves
    pub notified_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn target(&self) -> TargetRef {
        TargetRef::new(self.target_type, self.target_id)
    }

    /// Whether a `notified` invitation is past its deadline at `now`.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Notified && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Time from invitation to response, if both are known.
    pub fn response_time(&self) -> Option<Duration> {
        let responded_at = self.response.as_ref()?.responded_at?;
        Some(responded_at - self.notified_at?)
    }

    /// Deadline an invitation sent at `now` would carry.
    pub fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(i64::from(self.invitation_ttl_minutes))
    }
}

/// Queue entry draft produced by the queue builder, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQueueEntry {
    pub target_id: i64,
    pub target_type: TargetType,
    pub freelancer_id: i64,
    pub position: i32,
    pub score: f64,
    pub priority_bucket: Option<i32>,
    pub weights: ScoringWeights,
    pub breakdown: ScoreBreakdown,
    pub project_value: Option<f64>,
    pub metadata: Metadata,
    pub invitation_ttl_minutes: u32,
}

impl NewQueueEntry {
    pub fn target(&self) -> TargetRef {
        TargetRef::new(self.target_type, self.target_id)
    }

    /// Materialize the draft as a `pending` entry.
    pub fn into_entry(self, id: i64, generation: i64, now: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            id,
            target_id: self.target_id,
            target_type: self.target_type,
            freelancer_id: self.freelancer_id,
            generation,
            position: self.position,
            status: EntryStatus::Pending,
            score: self.score,
            priority_bucket: self.priority_bucket,
            weights: self.weights,
            breakdown: self.breakdown,
            project_value: self.project_value,
            metadata: self.metadata,
            response: None,
            invitation_ttl_minutes: self.invitation_ttl_minutes,
            version: 1,
            created_at: now,
            updated_at: now,
            notified_at: None,
            expires_at: None,
            resolved_at: None,
        }
    }
}
