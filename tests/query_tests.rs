//! Paginated listing and velocity metrics

mod common;

use autoassign_core::api::{ListQueueQuery, QueueApi};
use autoassign_core::services::{MetricValue, QueueFilter, QueueView};
use autoassign_core::state_machine::{EntryStatus, ResponseDetails};
use chrono::Duration;
use common::{project, TestEngine};

async fn seeded(candidates: i64) -> TestEngine {
    let harness = TestEngine::rating_only();
    let target = project(1);
    harness
        .provider
        .set_candidates(target, TestEngine::ranked_candidates(candidates));
    let mut config = harness.engine.default_builder_config();
    config.limit = candidates as u32;
    harness.engine.regenerate(target, &config).await.unwrap();
    harness
}

#[tokio::test]
async fn test_pagination_info_matches_totals() {
    let harness = seeded(7).await;
    let target = project(1);

    let first = harness
        .engine
        .list_queue(&QueueFilter::for_target(target).with_page(1, 3))
        .await
        .unwrap();
    assert_eq!(first.entries.len(), 3);
    assert_eq!(first.pagination.total_entries, 7);
    assert_eq!(first.pagination.total_pages, 3);
    assert_eq!(first.entries[0].position, 1);

    let last = harness
        .engine
        .list_queue(&QueueFilter::for_target(target).with_page(3, 3))
        .await
        .unwrap();
    assert_eq!(last.entries.len(), 1);
    assert_eq!(last.entries[0].position, 7);

    let beyond = harness
        .engine
        .list_queue(&QueueFilter::for_target(target).with_page(4, 3))
        .await
        .unwrap();
    assert!(beyond.entries.is_empty());
    assert_eq!(beyond.pagination.total_entries, 7);
}

#[tokio::test]
async fn test_freelancer_view_defaults_to_open_entries() {
    let harness = seeded(3).await;
    let lifecycle = harness.engine.lifecycle();

    // Freelancer 1 holds one open entry on target 1; give them a declined one on target 2
    let other = project(2);
    harness
        .provider
        .set_candidates(other, TestEngine::ranked_candidates(1));
    let config = harness.engine.default_builder_config();
    harness.engine.regenerate(other, &config).await.unwrap();
    let invited = lifecycle.notify_next(other).await.unwrap().unwrap();
    lifecycle
        .decline(invited.id, ResponseDetails::default())
        .await
        .unwrap();

    let open = harness
        .engine
        .list_queue(&QueueFilter::for_freelancer(1))
        .await
        .unwrap();
    assert_eq!(open.entries.len(), 1);
    assert_eq!(open.entries[0].status, EntryStatus::Pending);

    let everything = harness
        .engine
        .list_queue(&QueueFilter::for_freelancer(1).with_view(QueueView::Audit))
        .await
        .unwrap();
    assert_eq!(everything.entries.len(), 2);

    let declined = harness
        .engine
        .list_queue(&QueueFilter::for_freelancer(1).with_statuses(["declined,unknown"]))
        .await
        .unwrap();
    assert_eq!(declined.entries.len(), 1);
    assert_eq!(declined.entries[0].target_id, 2);
}

#[tokio::test]
async fn test_query_string_validation() {
    let harness = seeded(2).await;
    let api = QueueApi::new(harness.engine.clone());

    let listing = api
        .list(ListQueueQuery {
            target_id: Some("1".into()),
            target_type: Some("project".into()),
            statuses: Some("pending,bogus".into()),
            page_size: Some("1".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listing.entries.len(), 1);
    assert_eq!(listing.pagination.total_pages, 2);

    for query in [
        ListQueueQuery {
            freelancer_id: Some("-1".into()),
            ..Default::default()
        },
        ListQueueQuery {
            freelancer_id: Some("1".into()),
            page_size: Some("0".into()),
            ..Default::default()
        },
        ListQueueQuery {
            freelancer_id: Some("1".into()),
            page_size: Some("51".into()),
            ..Default::default()
        },
        ListQueueQuery::default(),
    ] {
        let error = api.list(query.clone()).await.unwrap_err();
        assert_eq!(error.status_code(), 400, "{query:?}");
    }
}

#[tokio::test]
async fn test_velocity_distinguishes_missing_and_thin_data() {
    let harness = seeded(6).await;
    let target = project(1);

    let empty = harness.engine.velocity(Some(target)).await.unwrap();
    assert_eq!(empty.median_response_seconds, MetricValue::NoSamples);
    assert_eq!(empty.acceptance_rate, MetricValue::NoSamples);

    let lifecycle = harness.engine.lifecycle();
    let first = lifecycle.notify_next(target).await.unwrap().unwrap();
    harness.clock.advance(Duration::seconds(30));
    lifecycle
        .accept(first.id, ResponseDetails::default())
        .await
        .unwrap();

    let thin = harness.engine.velocity(Some(target)).await.unwrap();
    assert!(matches!(
        thin.acceptance_rate,
        MetricValue::InsufficientData { samples: 1, .. }
    ));

    // Four more responses: two accepted, two declined, each after 30 seconds
    for index in 0..4 {
        let invited = lifecycle.notify_next(target).await.unwrap().unwrap();
        harness.clock.advance(Duration::seconds(30));
        if index % 2 == 0 {
            lifecycle.accept(invited.id, ResponseDetails::default()).await.unwrap();
        } else {
            lifecycle.decline(invited.id, ResponseDetails::default()).await.unwrap();
        }
    }

    let velocity = harness.engine.velocity(Some(target)).await.unwrap();
    assert_eq!(velocity.median_response_seconds.value(), Some(30.0));
    assert_eq!(velocity.acceptance_rate.value(), Some(0.6));
}
