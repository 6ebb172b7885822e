use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::EntryEvent,
    states::EntryStatus,
};
use crate::constants::scoring::MAX_RATING;
use crate::models::{EntryResponse, Metadata, QueueEntry};

const MAX_NOTE_LENGTH: usize = 4000;

/// Pure transition logic for queue entries.
///
/// Computes the next image of an entry for an event without touching storage;
/// the lifecycle manager persists the result with a conditional write.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryStateMachine;

impl EntryStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        entry_id: i64,
        current: EntryStatus,
        event: &EntryEvent,
    ) -> StateMachineResult<EntryStatus> {
        let target = event.target_status();
        if current.can_transition_to(target) {
            Ok(target)
        } else {
            Err(StateMachineError::InvalidTransition {
                entry_id,
                from: current.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Validate numeric and free-text fields carried by an event
    pub fn validate_payload(event: &EntryEvent) -> StateMachineResult<()> {
        match event {
            EntryEvent::Accept(details) | EntryEvent::Decline(details) => {
                check_note(details.notes.as_deref())?;
                check_note(details.reason_label.as_deref())?;
                check_note(details.reason_code.as_deref())
            }
            EntryEvent::Complete(details) => {
                if let Some(rating) = details.rating {
                    if !rating.is_finite() || !(0.0..=MAX_RATING).contains(&rating) {
                        return Err(StateMachineError::InvalidPayload(format!(
                            "rating must be between 0 and {MAX_RATING}, got {rating}"
                        )));
                    }
                }
                if let Some(value) = details.completion_value {
                    if !value.is_finite() || value < 0.0 {
                        return Err(StateMachineError::InvalidPayload(format!(
                            "completionValue must be a non-negative number, got {value}"
                        )));
                    }
                }
                check_note(details.notes.as_deref())
            }
            EntryEvent::Reassign { reason } => check_note(Some(reason)),
            EntryEvent::Notify | EntryEvent::Expire => Ok(()),
        }
    }

    /// Compute the entry image after applying `event` at `now`.
    pub fn apply(
        entry: &QueueEntry,
        event: &EntryEvent,
        metadata: Option<&Metadata>,
        now: DateTime<Utc>,
    ) -> StateMachineResult<QueueEntry> {
        let target = Self::determine_target_state(entry.id, entry.status, event)?;
        Self::validate_payload(event)?;

        // Responses after the deadline are never accepted
        if event.is_response() && entry.is_past_deadline(now) {
            return Err(StateMachineError::InvitationExpired { entry_id: entry.id });
        }
        // Only a passed deadline expires an invitation
        if matches!(event, EntryEvent::Expire) && !entry.is_past_deadline(now) {
            return Err(StateMachineError::DeadlineNotReached { entry_id: entry.id });
        }

        let mut next = entry.clone();
        next.status = target;
        next.version = entry.version + 1;
        next.updated_at = now;

        match event {
            EntryEvent::Notify => {
                next.notified_at = Some(now);
                next.expires_at = Some(entry.deadline_from(now));
            }
            EntryEvent::Accept(details) | EntryEvent::Decline(details) => {
                next.expires_at = None;
                next.resolved_at = Some(now);
                next.response = Some(EntryResponse {
                    notes: details.notes.clone(),
                    reason_code: details.reason_code.clone(),
                    reason_label: details.reason_label.clone(),
                    responded_at: Some(now),
                    ..Default::default()
                });
            }
            EntryEvent::Expire => {
                // expires_at stays for audit
                next.resolved_at = Some(now);
            }
            EntryEvent::Reassign { reason } => {
                next.expires_at = None;
                next.resolved_at = Some(now);
                next.metadata
                    .insert("reassignReason".to_string(), Value::String(reason.clone()));
            }
            EntryEvent::Complete(details) => {
                let mut response = entry.response.clone().unwrap_or_default();
                response.rating = details.rating;
                response.completion_value = details.completion_value;
                response.completed_at = Some(now);
                if details.notes.is_some() {
                    response.notes = details.notes.clone();
                }
                next.response = Some(response);
            }
        }

        if let Some(patch) = metadata {
            for (key, value) in patch {
                next.metadata.insert(key.clone(), value.clone());
            }
        }

        Ok(next)
    }
}

fn check_note(note: Option<&str>) -> StateMachineResult<()> {
    match note {
        Some(text) if text.len() > MAX_NOTE_LENGTH => Err(StateMachineError::InvalidPayload(
            format!("text field too long: {} chars (max: {MAX_NOTE_LENGTH})", text.len()),
        )),
        _ => Ok(()),
    }
}
