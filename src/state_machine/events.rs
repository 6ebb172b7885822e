use serde::{Deserialize, Serialize};

use super::errors::{StateMachineError, StateMachineResult};
use super::states::EntryStatus;
use crate::constants::reasons;
use crate::models::Metadata;

/// Details attached to a freelancer's accept/decline response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseDetails {
    pub notes: Option<String>,
    pub reason_code: Option<String>,
    pub reason_label: Option<String>,
}

/// Details attached to a completion signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionDetails {
    pub rating: Option<f64>,
    pub completion_value: Option<f64>,
    pub notes: Option<String>,
}

/// Events that can trigger queue entry state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EntryEvent {
    /// Deliver the invitation
    Notify,
    /// Candidate accepted
    Accept(ResponseDetails),
    /// Candidate declined
    Decline(ResponseDetails),
    /// Deadline passed without a response
    Expire,
    /// Superseded by regeneration or removed by an operator
    Reassign { reason: String },
    /// Accepted work finished
    Complete(CompletionDetails),
}

impl EntryEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Accept(_) => "accept",
            Self::Decline(_) => "decline",
            Self::Expire => "expire",
            Self::Reassign { .. } => "reassign",
            Self::Complete(_) => "complete",
        }
    }

    /// Status this event moves an entry into
    pub fn target_status(&self) -> EntryStatus {
        match self {
            Self::Notify => EntryStatus::Notified,
            Self::Accept(_) => EntryStatus::Accepted,
            Self::Decline(_) => EntryStatus::Declined,
            Self::Expire => EntryStatus::Expired,
            Self::Reassign { .. } => EntryStatus::Reassigned,
            Self::Complete(_) => EntryStatus::Completed,
        }
    }

    /// Whether the event is a candidate response bounded by the invitation deadline
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Accept(_) | Self::Decline(_))
    }
}

/// Transition payload accepted by `updateQueueEntry`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransitionRequest {
    pub status: EntryStatus,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub completion_value: Option<f64>,
    #[serde(default)]
    pub reason_code: Option<String>,
    #[serde(default)]
    pub reason_label: Option<String>,
    #[serde(default)]
    pub response_notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl TransitionRequest {
    pub fn to_status(status: EntryStatus) -> Self {
        Self {
            status,
            rating: None,
            completion_value: None,
            reason_code: None,
            reason_label: None,
            response_notes: None,
            metadata: None,
        }
    }

    /// `rating` and `completionValue` describe finished work and are only
    /// accepted on a transition to `completed`.
    pub fn validate_fields(&self) -> StateMachineResult<()> {
        if self.status == EntryStatus::Completed {
            return Ok(());
        }
        let stray: Vec<&str> = [
            ("rating", self.rating.is_some()),
            ("completionValue", self.completion_value.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, present)| present.then_some(field))
        .collect();
        if stray.is_empty() {
            Ok(())
        } else {
            Err(StateMachineError::InvalidPayload(format!(
                "{} only apply to status completed, got {}",
                stray.join(", "),
                self.status
            )))
        }
    }

    /// Translate the requested status into the event that produces it.
    ///
    /// Returns `None` for statuses no caller may request directly (`pending`).
    pub fn to_event(&self) -> Option<EntryEvent> {
        let response = || ResponseDetails {
            notes: self.response_notes.clone(),
            reason_code: self.reason_code.clone(),
            reason_label: self.reason_label.clone(),
        };

        match self.status {
            EntryStatus::Pending => None,
            EntryStatus::Notified => Some(EntryEvent::Notify),
            EntryStatus::Accepted => Some(EntryEvent::Accept(response())),
            EntryStatus::Declined => Some(EntryEvent::Decline(response())),
            EntryStatus::Expired => Some(EntryEvent::Expire),
            EntryStatus::Reassigned => Some(EntryEvent::Reassign {
                reason: self
                    .reason_code
                    .clone()
                    .unwrap_or_else(|| reasons::MANUAL_REMOVAL.to_string()),
            }),
            EntryStatus::Completed => Some(EntryEvent::Complete(CompletionDetails {
                rating: self.rating,
                completion_value: self.completion_value,
                notes: self.response_notes.clone(),
            })),
        }
    }
}
