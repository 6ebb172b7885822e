//! Queue event payloads delivered to live subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::events;
use crate::models::{QueueEntry, TargetRef, TargetType};
use crate::state_machine::EntryStatus;

/// One message on a target's stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    pub target_id: i64,
    pub target_type: TargetType,
    /// Per-target, monotonically increasing while the target has subscribers
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
    pub payload: QueueEventPayload,
}

impl QueueEvent {
    pub fn target(&self) -> TargetRef {
        TargetRef::new(self.target_type, self.target_id)
    }

    pub fn name(&self) -> &'static str {
        self.payload.name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueEventPayload {
    /// Full current queue; always the first message of a subscription
    Snapshot {
        generation: Option<i64>,
        entries: Vec<QueueEntry>,
    },
    /// A new generation replaced the queue
    Regenerated {
        generation: i64,
        entries: Vec<QueueEntry>,
        /// Ids of open entries from earlier generations that were invalidated
        reassigned: Vec<i64>,
    },
    /// One entry changed status
    EntryUpdated {
        previous_status: EntryStatus,
        entry: QueueEntry,
    },
}

impl QueueEventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => events::QUEUE_SNAPSHOT,
            Self::Regenerated { .. } => events::QUEUE_REGENERATED,
            Self::EntryUpdated { entry, .. } => match entry.status {
                EntryStatus::Notified => events::ENTRY_NOTIFIED,
                EntryStatus::Accepted => events::ENTRY_ACCEPTED,
                EntryStatus::Declined => events::ENTRY_DECLINED,
                EntryStatus::Expired => events::ENTRY_EXPIRED,
                EntryStatus::Reassigned => events::ENTRY_REASSIGNED,
                EntryStatus::Completed => events::ENTRY_COMPLETED,
                EntryStatus::Pending => events::ENTRY_UPDATED,
            },
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot { .. })
    }
}
