//! Invitation lifecycle, expiry sweep and concurrent response handling

mod common;

use autoassign_core::api::QueueApi;
use autoassign_core::models::QueueEntry;
use autoassign_core::orchestration::ExpirySweeper;
use autoassign_core::state_machine::{
    CompletionDetails, EntryStatus, ResponseDetails, TransitionRequest,
};
use autoassign_core::store::QueueStore;
use autoassign_core::AutoAssignError;
use chrono::Duration;
use common::{project, TestEngine};
use serde_json::json;

/// Regenerate `target` with three candidates and invite position 1
async fn notified_entry(harness: &TestEngine, target_id: i64) -> QueueEntry {
    let target = project(target_id);
    harness
        .provider
        .set_candidates(target, TestEngine::ranked_candidates(3));
    let config = harness.engine.default_builder_config();
    harness.engine.regenerate(target, &config).await.unwrap();
    harness
        .engine
        .lifecycle()
        .notify_next(target)
        .await
        .unwrap()
        .expect("a pending entry to invite")
}

#[tokio::test]
async fn test_expiry_sweep_retains_deadline() {
    let harness = TestEngine::rating_only();
    let mut entry = notified_entry(&harness, 1).await;

    // Re-seed the invitation with a one second deadline
    entry.expires_at = Some(harness.now() + Duration::seconds(1));
    let entry = harness.store.insert_raw(entry);

    harness.clock.advance(Duration::seconds(2));
    let sweeper = ExpirySweeper::from_settings(
        harness.engine.lifecycle().clone(),
        &harness.engine.config().lifecycle,
    );
    let report = sweeper.run_once().await.unwrap();
    assert_eq!(report.expired, 1);

    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EntryStatus::Expired);
    assert_eq!(stored.expires_at, entry.expires_at);
    assert_eq!(stored.resolved_at, Some(harness.now()));
    assert_eq!(stored.version, entry.version + 1);
}

#[tokio::test]
async fn test_sweep_ignores_invitations_not_yet_due() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 2).await;

    harness.clock.advance(Duration::minutes(1));
    let report = harness.engine.sweeper().run_once().await.unwrap();
    assert_eq!(report.expired, 0);

    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EntryStatus::Notified);
}

#[tokio::test]
async fn test_declined_entry_cannot_be_renotified() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 3).await;
    let api = QueueApi::new(harness.engine.clone());

    let declined = api
        .update_entry(
            &entry.id.to_string(),
            json!({"status": "declined", "reasonCode": "busy", "reasonLabel": "Too busy"}),
        )
        .await
        .unwrap();
    assert_eq!(declined.status, EntryStatus::Declined);
    assert_eq!(
        declined.response.as_ref().unwrap().reason_code.as_deref(),
        Some("busy")
    );

    let error = api
        .update_entry(&entry.id.to_string(), json!({"status": "notified"}))
        .await
        .unwrap_err();
    assert_eq!(error.status_code(), 409);

    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored, declined);
}

#[tokio::test]
async fn test_late_response_expires_entry() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 4).await;

    harness
        .clock
        .advance(Duration::minutes(i64::from(entry.invitation_ttl_minutes) + 1));
    let error = harness
        .engine
        .lifecycle()
        .accept(entry.id, ResponseDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(error, AutoAssignError::InvitationExpired { .. }));

    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EntryStatus::Expired);
}

#[tokio::test]
async fn test_expired_status_is_refused_while_invitation_is_open() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 8).await;
    let api = QueueApi::new(harness.engine.clone());

    harness
        .clock
        .advance(Duration::minutes(i64::from(entry.invitation_ttl_minutes) - 1));
    let error = api
        .update_entry(&entry.id.to_string(), json!({"status": "expired"}))
        .await
        .unwrap_err();
    assert_eq!(error.status_code(), 409);
    assert_eq!(error.error_code(), "INVITATION_STILL_OPEN");

    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored, entry);

    // The invitation can still be answered
    let accepted = api
        .update_entry(&entry.id.to_string(), json!({"status": "accepted"}))
        .await
        .unwrap();
    assert_eq!(accepted.status, EntryStatus::Accepted);
}

#[tokio::test]
async fn test_expired_status_is_applied_once_deadline_passes() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 9).await;
    let api = QueueApi::new(harness.engine.clone());

    harness
        .clock
        .advance(Duration::minutes(i64::from(entry.invitation_ttl_minutes)));
    let expired = api
        .update_entry(&entry.id.to_string(), json!({"status": "expired"}))
        .await
        .unwrap();
    assert_eq!(expired.status, EntryStatus::Expired);
    assert_eq!(expired.expires_at, entry.expires_at);
}

#[tokio::test]
async fn test_completion_fields_on_response_are_rejected() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 10).await;
    let api = QueueApi::new(harness.engine.clone());

    for body in [
        json!({"status": "accepted", "rating": 4}),
        json!({"status": "declined", "completionValue": 250.0}),
    ] {
        let error = api
            .update_entry(&entry.id.to_string(), body)
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), 400);
    }

    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored, entry);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_response_racing_sweep_ends_in_one_terminal_status() {
    for round in 0..20 {
        let harness = TestEngine::rating_only();
        let entry = notified_entry(&harness, 100 + round).await;
        harness
            .clock
            .advance(Duration::minutes(i64::from(entry.invitation_ttl_minutes)));

        let entry_id = entry.id;
        let lifecycle = harness.engine.lifecycle().clone();
        let responder = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.accept(entry_id, ResponseDetails::default()).await }
        });
        let sweeper = tokio::spawn(async move { lifecycle.sweep_expired(10).await });

        let response = responder.await.unwrap();
        let report = sweeper.await.unwrap().unwrap();

        let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Expired);
        assert!(stored.response.is_none());
        assert_eq!(stored.version, entry.version + 1, "exactly one write");
        assert!(matches!(
            response,
            Err(AutoAssignError::InvitationExpired { .. })
        ));
        assert!(report.expired <= 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_responses_have_one_winner() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 5).await;

    let entry_id = entry.id;
    let mut handles = Vec::new();
    for attempt in 0..8 {
        let lifecycle = harness.engine.lifecycle().clone();
        handles.push(tokio::spawn(async move {
            if attempt % 2 == 0 {
                lifecycle.accept(entry_id, ResponseDetails::default()).await
            } else {
                lifecycle.decline(entry_id, ResponseDetails::default()).await
            }
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(updated) => winners.push(updated),
            Err(
                AutoAssignError::InvalidTransition { .. }
                | AutoAssignError::ConcurrentModification { .. },
            ) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.status, winners[0].status);
    assert!(stored.status.is_terminal() || stored.status == EntryStatus::Accepted);
    assert_eq!(stored.version, entry.version + 1);
}

#[tokio::test]
async fn test_accept_then_complete_records_rating() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 6).await;
    let lifecycle = harness.engine.lifecycle();

    lifecycle
        .accept(entry.id, ResponseDetails::default())
        .await
        .unwrap();
    let completed = lifecycle
        .complete(
            entry.id,
            CompletionDetails {
                rating: Some(4.5),
                completion_value: Some(1200.0),
                notes: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(completed.status, EntryStatus::Completed);
    let response = completed.response.unwrap();
    assert_eq!(response.rating, Some(4.5));
    assert!(response.responded_at.is_some());
    assert!(response.completed_at.is_some());
}

#[tokio::test]
async fn test_out_of_range_completion_rating_is_rejected() {
    let harness = TestEngine::rating_only();
    let entry = notified_entry(&harness, 7).await;
    let lifecycle = harness.engine.lifecycle();
    lifecycle
        .accept(entry.id, ResponseDetails::default())
        .await
        .unwrap();

    let mut request = TransitionRequest::to_status(EntryStatus::Completed);
    request.rating = Some(7.0);
    let error = lifecycle
        .update_queue_entry(entry.id, &request)
        .await
        .unwrap_err();
    assert!(matches!(error, AutoAssignError::Validation(_)));

    let stored = harness.store.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EntryStatus::Accepted);
}

#[tokio::test]
async fn test_reassign_freelancer_supersedes_open_entries() {
    let harness = TestEngine::rating_only();
    let first = notified_entry(&harness, 8).await;
    let second = notified_entry(&harness, 9).await;
    assert_eq!(first.freelancer_id, second.freelancer_id);

    let reassigned = harness
        .engine
        .lifecycle()
        .reassign_freelancer(first.freelancer_id, "account_suspended")
        .await
        .unwrap();
    assert_eq!(reassigned.len(), 2);
    assert!(reassigned
        .iter()
        .all(|entry| entry.status == EntryStatus::Reassigned));
    assert_eq!(
        reassigned[0].metadata["reassignReason"],
        json!("account_suspended")
    );

    let open = harness
        .store
        .open_entries_for_freelancer(first.freelancer_id)
        .await
        .unwrap();
    assert!(open.is_empty());
}

#[tokio::test]
async fn test_notify_next_exhausts_queue() {
    let harness = TestEngine::rating_only();
    let target = project(10);
    harness
        .provider
        .set_candidates(target, TestEngine::ranked_candidates(2));
    let config = harness.engine.default_builder_config();
    harness.engine.regenerate(target, &config).await.unwrap();

    let lifecycle = harness.engine.lifecycle();
    let first = lifecycle.notify_next(target).await.unwrap().unwrap();
    let second = lifecycle.notify_next(target).await.unwrap().unwrap();
    assert_eq!((first.position, second.position), (1, 2));
    assert!(lifecycle.notify_next(target).await.unwrap().is_none());
}
