//! # Invitation Lifecycle Manager
//!
//! Drives queue entries through their state machine.
//!
//! Every mutation is a read-modify-write keyed on `(id, status, version)`:
//! the entry is read, the next image is computed by [`EntryStateMachine`],
//! and the store applies it only if nothing changed in between. A lost race
//! re-reads and re-evaluates the event against the fresh image, so a response
//! racing the expiry sweep ends in exactly one terminal status.
//!
//! Writes are never replayed after a timeout. A timed-out write is resolved by
//! re-reading the entry and reporting whatever state it is actually in.
//!
//! Each write and the event announcing it happen under the target's commit
//! permit, so subscribers receive a target's events in commit order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AutoAssignError, Result};
use crate::events::QueueEventPublisher;
use crate::logging::{log_entry_transition, log_error, log_queue_operation};
use crate::models::{Metadata, QueueEntry, TargetRef};
use crate::state_machine::{
    CompletionDetails, EntryEvent, EntryStateMachine, EntryStatus, ResponseDetails,
    StateMachineError, TransitionRequest,
};
use crate::store::{CasOutcome, QueueStore};
use crate::utils::SharedClock;

/// Re-reads allowed when a conditional write loses a race
pub const MAX_CAS_ATTEMPTS: usize = 3;

/// Result of one expiry sweep cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Due entries found
    pub scanned: usize,
    /// Entries this cycle moved to `expired`
    pub expired: usize,
    /// Entries that were resolved by someone else first, or failed to write
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct InvitationLifecycleManager {
    store: Arc<dyn QueueStore>,
    publisher: QueueEventPublisher,
    clock: SharedClock,
    store_timeout: Duration,
}

impl InvitationLifecycleManager {
    pub fn new(
        store: Arc<dyn QueueStore>,
        publisher: QueueEventPublisher,
        clock: SharedClock,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            store_timeout,
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Apply a transition payload (the `PATCH /queue/{entryId}` body).
    pub async fn update_queue_entry(
        &self,
        entry_id: i64,
        request: &TransitionRequest,
    ) -> Result<QueueEntry> {
        request.validate_fields()?;
        let Some(event) = request.to_event() else {
            let current = self.load(entry_id).await?;
            return Err(AutoAssignError::InvalidTransition {
                entry_id,
                from: current.status.to_string(),
                to: EntryStatus::Pending.to_string(),
            });
        };
        self.apply_event(entry_id, &event, request.metadata.as_ref())
            .await
    }

    /// pending → notified; the deadline is `now + invitation TTL`.
    pub async fn send_invitation(&self, entry_id: i64) -> Result<QueueEntry> {
        self.apply_event(entry_id, &EntryEvent::Notify, None).await
    }

    /// Invite the lowest-position pending entry of the target's current
    /// generation. `None` when nothing is left to invite.
    pub async fn notify_next(&self, target: TargetRef) -> Result<Option<QueueEntry>> {
        let entries = self
            .with_timeout("current_entries", self.store.current_entries(target))
            .await?;

        let mut pending: Vec<&QueueEntry> = entries
            .iter()
            .filter(|entry| entry.status == EntryStatus::Pending)
            .collect();
        pending.sort_by_key(|entry| (entry.position, entry.id));

        for entry in pending {
            match self.send_invitation(entry.id).await {
                Ok(notified) => return Ok(Some(notified)),
                // Another caller got to this one first
                Err(
                    AutoAssignError::InvalidTransition { .. }
                    | AutoAssignError::ConcurrentModification { .. },
                ) => continue,
                Err(error) => return Err(error),
            }
        }
        Ok(None)
    }

    pub async fn accept(&self, entry_id: i64, details: ResponseDetails) -> Result<QueueEntry> {
        self.apply_event(entry_id, &EntryEvent::Accept(details), None)
            .await
    }

    pub async fn decline(&self, entry_id: i64, details: ResponseDetails) -> Result<QueueEntry> {
        self.apply_event(entry_id, &EntryEvent::Decline(details), None)
            .await
    }

    /// accepted → completed, signalled once the actual work is done.
    pub async fn complete(&self, entry_id: i64, details: CompletionDetails) -> Result<QueueEntry> {
        self.apply_event(entry_id, &EntryEvent::Complete(details), None)
            .await
    }

    /// Administratively supersede one open entry.
    pub async fn remove_entry(&self, entry_id: i64, reason: &str) -> Result<QueueEntry> {
        let event = EntryEvent::Reassign {
            reason: reason.to_string(),
        };
        self.apply_event(entry_id, &event, None).await
    }

    /// Supersede every open entry of a freelancer who became ineligible.
    ///
    /// Entries resolved concurrently by someone else are left as they are.
    pub async fn reassign_freelancer(
        &self,
        freelancer_id: i64,
        reason: &str,
    ) -> Result<Vec<QueueEntry>> {
        let open = self
            .with_timeout(
                "open_entries_for_freelancer",
                self.store.open_entries_for_freelancer(freelancer_id),
            )
            .await?;

        let mut reassigned = Vec::with_capacity(open.len());
        for entry in open {
            match self.remove_entry(entry.id, reason).await {
                Ok(updated) => reassigned.push(updated),
                Err(
                    AutoAssignError::InvalidTransition { .. }
                    | AutoAssignError::ConcurrentModification { .. }
                    | AutoAssignError::EntryNotFound(_),
                ) => {
                    debug!(entry_id = entry.id, freelancer_id, "Entry resolved before reassignment");
                }
                Err(error) => return Err(error),
            }
        }

        log_queue_operation(
            "reassign_freelancer",
            None,
            None,
            None,
            "completed",
            Some(&format!(
                "freelancer_id={freelancer_id} reassigned={}",
                reassigned.len()
            )),
        );
        Ok(reassigned)
    }

    /// Expire up to `batch_size` invitations whose deadline has passed.
    pub async fn sweep_expired(&self, batch_size: usize) -> Result<SweepReport> {
        let now = self.clock.now();
        let due = self
            .with_timeout(
                "find_due_expirations",
                self.store.find_due_expirations(now, batch_size),
            )
            .await?;

        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };

        for entry in due {
            match self.expire_if_due(entry, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => report.skipped += 1,
                Err(error) => {
                    report.skipped += 1;
                    log_error(
                        "InvitationLifecycleManager",
                        "sweep_expired",
                        &error.to_string(),
                        None,
                    );
                }
            }
        }

        if report.scanned > 0 {
            log_queue_operation(
                "expiry_sweep",
                None,
                None,
                None,
                "completed",
                Some(&format!(
                    "scanned={} expired={} skipped={}",
                    report.scanned, report.expired, report.skipped
                )),
            );
        }
        Ok(report)
    }

    /// Conditionally expire one due entry; false if it was resolved first.
    async fn expire_if_due(&self, mut entry: QueueEntry, now: DateTime<Utc>) -> Result<bool> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            if !entry.is_past_deadline(now) {
                return Ok(false);
            }
            let next = EntryStateMachine::apply(&entry, &EntryEvent::Expire, None, now)?;
            match self.commit(&next, &entry).await? {
                CasOutcome::Applied(_) => return Ok(true),
                CasOutcome::Conflict { current } => entry = current,
                CasOutcome::Missing => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Read-modify-write one entry, re-evaluating on lost races.
    async fn apply_event(
        &self,
        entry_id: i64,
        event: &EntryEvent,
        metadata: Option<&Metadata>,
    ) -> Result<QueueEntry> {
        if entry_id <= 0 {
            return Err(AutoAssignError::validation(format!(
                "entryId must be a positive integer, got {entry_id}"
            )));
        }

        let mut current = self.load(entry_id).await?;
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let now = self.clock.now();
            let next = match EntryStateMachine::apply(&current, event, metadata, now) {
                Ok(next) => next,
                Err(StateMachineError::InvitationExpired { entry_id }) => {
                    // The sweep has not reached it yet; resolve it now
                    if let Err(error) = self.expire_if_due(current, now).await {
                        warn!(entry_id, error = %error, "Request-time expiry failed");
                    }
                    return Err(AutoAssignError::InvitationExpired { entry_id });
                }
                Err(error) => return Err(error.into()),
            };

            match self.commit(&next, &current).await? {
                CasOutcome::Applied(stored) => return Ok(stored),
                CasOutcome::Conflict { current: fresh } => {
                    debug!(
                        entry_id,
                        attempt,
                        event = event.event_type(),
                        expected_version = current.version,
                        found_version = fresh.version,
                        "Entry changed underneath transition, re-evaluating"
                    );
                    current = fresh;
                }
                CasOutcome::Missing => return Err(AutoAssignError::EntryNotFound(entry_id)),
            }
        }

        Err(AutoAssignError::ConcurrentModification {
            entry_id,
            current_status: current.status.to_string(),
        })
    }

    async fn load(&self, entry_id: i64) -> Result<QueueEntry> {
        self.with_timeout("get_entry", self.store.get_entry(entry_id))
            .await?
            .ok_or(AutoAssignError::EntryNotFound(entry_id))
    }

    /// Write `next` over `expected` and announce it while holding the
    /// target's commit permit.
    async fn commit(&self, next: &QueueEntry, expected: &QueueEntry) -> Result<CasOutcome> {
        let _permit = self.publisher.begin_commit(expected.target()).await;
        let outcome = self.write(next, expected.status, expected.version).await?;
        if let CasOutcome::Applied(stored) = &outcome {
            self.announce(expected.status, stored);
        }
        Ok(outcome)
    }

    /// Conditional write with a timeout. On timeout the entry is re-read to
    /// learn whether the write landed; it is never replayed.
    async fn write(
        &self,
        next: &QueueEntry,
        expected_status: EntryStatus,
        expected_version: i64,
    ) -> Result<CasOutcome> {
        let attempt = tokio::time::timeout(
            self.store_timeout,
            self.store
                .compare_and_swap(next, expected_status, expected_version),
        )
        .await;

        match attempt {
            Ok(outcome) => Ok(outcome?),
            Err(_) => {
                warn!(
                    entry_id = next.id,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Conditional write timed out, re-reading entry"
                );
                match self
                    .with_timeout("get_entry", self.store.get_entry(next.id))
                    .await?
                {
                    Some(stored) if stored.version == next.version && stored.status == next.status => {
                        Ok(CasOutcome::Applied(stored))
                    }
                    Some(stored)
                        if stored.version == expected_version
                            && stored.status == expected_status =>
                    {
                        Err(AutoAssignError::Timeout(format!(
                            "write for entry {} after {}ms; entry unchanged",
                            next.id,
                            self.store_timeout.as_millis()
                        )))
                    }
                    Some(stored) => Ok(CasOutcome::Conflict { current: stored }),
                    None => Ok(CasOutcome::Missing),
                }
            }
        }
    }

    async fn with_timeout<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: std::future::Future<Output = crate::store::StoreResult<T>>,
    {
        tokio::time::timeout(self.store_timeout, future)
            .await
            .map_err(|_| {
                AutoAssignError::Timeout(format!(
                    "{operation} after {}ms",
                    self.store_timeout.as_millis()
                ))
            })?
            .map_err(AutoAssignError::from)
    }

    fn announce(&self, previous_status: EntryStatus, entry: &QueueEntry) {
        log_entry_transition(
            entry.id,
            entry.target_type.as_str(),
            entry.target_id,
            previous_status.as_str(),
            entry.status.as_str(),
            entry.version,
        );
        self.publisher.publish_entry_update(previous_status, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewQueueEntry, TargetType};
    use crate::scoring::{ScoreBreakdown, ScoringWeights};
    use crate::store::InMemoryQueueStore;
    use crate::utils::{Clock, ManualClock};

    fn draft(target: TargetRef, freelancer_id: i64, position: i32) -> NewQueueEntry {
        NewQueueEntry {
            target_id: target.target_id,
            target_type: target.target_type,
            freelancer_id,
            position,
            score: 50.0,
            priority_bucket: None,
            weights: ScoringWeights::default(),
            breakdown: ScoreBreakdown::default(),
            project_value: None,
            metadata: Metadata::new(),
            invitation_ttl_minutes: 10,
        }
    }

    async fn setup() -> (InvitationLifecycleManager, Arc<ManualClock>, Vec<QueueEntry>) {
        let store = Arc::new(InMemoryQueueStore::new());
        let clock = Arc::new(ManualClock::default());
        let target = TargetRef::new(TargetType::Gig, 4);
        let replaced = store
            .replace_generation(
                target,
                vec![draft(target, 1, 1), draft(target, 2, 2)],
                clock.now(),
            )
            .await
            .unwrap();
        let publisher = QueueEventPublisher::new(store.clone(), 8).unwrap();
        let manager = InvitationLifecycleManager::new(
            store,
            publisher,
            clock.clone(),
            Duration::from_secs(1),
        );
        (manager, clock, replaced.entries)
    }

    #[tokio::test]
    async fn test_send_then_accept() {
        let (manager, clock, entries) = setup().await;
        let notified = manager.send_invitation(entries[0].id).await.unwrap();
        assert_eq!(notified.status, EntryStatus::Notified);
        assert!(notified.expires_at.is_some());

        clock.advance(chrono::Duration::minutes(5));
        let accepted = manager
            .accept(entries[0].id, ResponseDetails::default())
            .await
            .unwrap();
        assert_eq!(accepted.status, EntryStatus::Accepted);
        assert!(accepted.expires_at.is_none());
        assert_eq!(accepted.version, 3);
    }

    #[tokio::test]
    async fn test_late_response_expires_entry() {
        let (manager, clock, entries) = setup().await;
        manager.send_invitation(entries[0].id).await.unwrap();
        clock.advance(chrono::Duration::minutes(11));

        let result = manager
            .decline(entries[0].id, ResponseDetails::default())
            .await;
        assert_eq!(
            result.unwrap_err(),
            AutoAssignError::InvitationExpired {
                entry_id: entries[0].id
            }
        );

        let stored = manager.load(entries[0].id).await.unwrap();
        assert_eq!(stored.status, EntryStatus::Expired);
        assert!(stored.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_pending_request_is_invalid_transition() {
        let (manager, _clock, entries) = setup().await;
        let request = TransitionRequest::to_status(EntryStatus::Pending);
        let result = manager.update_queue_entry(entries[0].id, &request).await;
        assert!(matches!(
            result,
            Err(AutoAssignError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_early_expiry_request_leaves_invitation_open() {
        let (manager, clock, entries) = setup().await;
        manager.send_invitation(entries[0].id).await.unwrap();
        clock.advance(chrono::Duration::minutes(9));

        let request = TransitionRequest::to_status(EntryStatus::Expired);
        let result = manager.update_queue_entry(entries[0].id, &request).await;
        assert_eq!(
            result.unwrap_err(),
            AutoAssignError::InvitationStillOpen {
                entry_id: entries[0].id
            }
        );
        assert_eq!(
            manager.load(entries[0].id).await.unwrap().status,
            EntryStatus::Notified
        );
    }

    #[tokio::test]
    async fn test_rating_on_acceptance_is_rejected() {
        let (manager, _clock, entries) = setup().await;
        manager.send_invitation(entries[0].id).await.unwrap();

        let mut request = TransitionRequest::to_status(EntryStatus::Accepted);
        request.rating = Some(5.0);
        let result = manager.update_queue_entry(entries[0].id, &request).await;
        assert!(matches!(result, Err(AutoAssignError::Validation(_))));
        assert_eq!(
            manager.load(entries[0].id).await.unwrap().status,
            EntryStatus::Notified
        );
    }

    #[tokio::test]
    async fn test_notify_next_walks_positions() {
        let (manager, _clock, entries) = setup().await;
        let target = entries[0].target();
        let first = manager.notify_next(target).await.unwrap().unwrap();
        let second = manager.notify_next(target).await.unwrap().unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
        assert!(manager.notify_next(target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_entry_is_not_found() {
        let (manager, _clock, _entries) = setup().await;
        let result = manager.send_invitation(999).await;
        assert_eq!(result.unwrap_err(), AutoAssignError::EntryNotFound(999));
    }

    #[tokio::test]
    async fn test_non_positive_id_rejected() {
        let (manager, _clock, _entries) = setup().await;
        let result = manager.send_invitation(0).await;
        assert!(matches!(result, Err(AutoAssignError::Validation(_))));
    }
}
