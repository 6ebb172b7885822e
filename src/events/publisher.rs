//! # Queue Event Publisher
//!
//! Per-target fan-out of [`QueueEvent`]s to live subscribers.
//!
//! ## Delivery model
//!
//! - Every subscriber owns a bounded channel of `subscriber_buffer` events.
//!   Publishing uses `try_send` and never waits, so a slow client can never
//!   stall a queue mutation.
//! - A subscriber whose buffer is full is disconnected: its sender is dropped,
//!   the stream ends after draining what was already buffered, and the client
//!   recovers by subscribing again.
//! - A new subscription is registered before its snapshot is read, and the
//!   snapshot is yielded first. An update racing the snapshot read may appear
//!   both inside the snapshot and as a following event (at-least-once);
//!   `version` on each entry lets clients discard the stale copy.
//! - Dropping a [`QueueSubscription`] unregisters it immediately. A target's
//!   registry slot is released when its last subscriber leaves.
//! - Writers hold a [`CommitPermit`] from before their store write until
//!   after they publish. Events of one target therefore leave in the order
//!   their writes committed.

use chrono::Utc;
use dashmap::DashMap;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{QueueEvent, QueueEventPayload};
use crate::error::{AutoAssignError, Result};
use crate::models::{QueueEntry, TargetRef};
use crate::state_machine::EntryStatus;
use crate::store::QueueStore;

const DEFAULT_SNAPSHOT_TIMEOUT_MS: u64 = 2_000;

/// Error types for event publishing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishError {
    #[error("Subscriber buffer must be greater than 0")]
    InvalidBuffer,
    #[error("Failed to load snapshot for {target}: {message}")]
    SnapshotUnavailable { target: TargetRef, message: String },
}

impl From<PublishError> for AutoAssignError {
    fn from(error: PublishError) -> Self {
        match error {
            PublishError::InvalidBuffer => AutoAssignError::Configuration(error.to_string()),
            PublishError::SnapshotUnavailable { .. } => AutoAssignError::Storage(error.to_string()),
        }
    }
}

/// Publisher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherStats {
    pub targets: usize,
    pub subscribers: usize,
    pub events_published: u64,
    pub subscribers_dropped: u64,
}

#[derive(Debug, Default)]
struct TargetChannel {
    state: Mutex<ChannelState>,
}

#[derive(Debug, Default)]
struct ChannelState {
    sequence: u64,
    subscribers: HashMap<Uuid, mpsc::Sender<QueueEvent>>,
}

#[derive(Debug)]
struct PublisherInner {
    targets: DashMap<TargetRef, Arc<TargetChannel>>,
    commit_locks: DashMap<TargetRef, Arc<AsyncMutex<()>>>,
    store: Arc<dyn QueueStore>,
    subscriber_buffer: usize,
    events_published: AtomicU64,
    subscribers_dropped: AtomicU64,
}

impl PublisherInner {
    fn unsubscribe(&self, target: TargetRef, id: Uuid) {
        if let Some(channel) = self.targets.get(&target) {
            channel.state.lock().subscribers.remove(&id);
        }
        // Release the slot only if nobody joined in the meantime
        self.targets
            .remove_if(&target, |_, channel| channel.state.lock().subscribers.is_empty());
        debug!(queue = %target, subscriber = %id, "Subscriber left");
    }
}

/// Exclusive right to commit and announce a change to one target.
///
/// Released on drop; the target's lock is freed once nobody holds or waits
/// for it.
#[derive(Debug)]
pub struct CommitPermit {
    guard: Option<OwnedMutexGuard<()>>,
    target: TargetRef,
    inner: Arc<PublisherInner>,
}

impl Drop for CommitPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.inner
            .commit_locks
            .remove_if(&self.target, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Per-target registry of live subscribers
#[derive(Debug, Clone)]
pub struct QueueEventPublisher {
    inner: Arc<PublisherInner>,
    snapshot_timeout: Duration,
}

impl QueueEventPublisher {
    /// `store` supplies the snapshot every new subscriber starts with.
    pub fn new(
        store: Arc<dyn QueueStore>,
        subscriber_buffer: usize,
    ) -> std::result::Result<Self, PublishError> {
        if subscriber_buffer == 0 {
            return Err(PublishError::InvalidBuffer);
        }
        Ok(Self {
            inner: Arc::new(PublisherInner {
                targets: DashMap::new(),
                commit_locks: DashMap::new(),
                store,
                subscriber_buffer,
                events_published: AtomicU64::new(0),
                subscribers_dropped: AtomicU64::new(0),
            }),
            snapshot_timeout: Duration::from_millis(DEFAULT_SNAPSHOT_TIMEOUT_MS),
        })
    }

    /// Bound on the store read behind every new subscription's snapshot
    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    /// Wait for the right to commit a change to `target`.
    ///
    /// Hold the permit across the store write and the publish that announces
    /// it.
    pub async fn begin_commit(&self, target: TargetRef) -> CommitPermit {
        let lock = self.inner.commit_locks.entry(target).or_default().clone();
        let guard = lock.lock_owned().await;
        CommitPermit {
            guard: Some(guard),
            target,
            inner: self.inner.clone(),
        }
    }

    /// Subscribe to `target`. The first item of the returned stream is a
    /// snapshot of the target's current generation.
    pub async fn subscribe(&self, target: TargetRef) -> Result<QueueSubscription> {
        let (sender, receiver) = mpsc::channel(self.inner.subscriber_buffer);
        let id = Uuid::new_v4();

        let sequence = {
            let channel = self.inner.targets.entry(target).or_default();
            let mut state = channel.state.lock();
            state.subscribers.insert(id, sender);
            state.sequence
        };

        // From here on the handle owns the registration, so an early return
        // below still unregisters through Drop.
        let mut subscription = QueueSubscription {
            id,
            target,
            snapshot: None,
            receiver,
            inner: self.inner.clone(),
        };

        let entries = tokio::time::timeout(
            self.snapshot_timeout,
            self.inner.store.current_entries(target),
        )
        .await
        .map_err(|_| {
            AutoAssignError::Timeout(format!(
                "snapshot for {target} after {}ms",
                self.snapshot_timeout.as_millis()
            ))
        })?
        .map_err(|e| PublishError::SnapshotUnavailable {
            target,
            message: e.to_string(),
        })?;
        let generation = entries.first().map(|entry| entry.generation);

        subscription.snapshot = Some(QueueEvent {
            target_id: target.target_id,
            target_type: target.target_type,
            sequence,
            published_at: Utc::now(),
            payload: QueueEventPayload::Snapshot {
                generation,
                entries,
            },
        });

        info!(queue = %target, subscriber = %id, "📡 Subscriber joined");
        Ok(subscription)
    }

    /// Fan `payload` out to every subscriber of `target` without waiting.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, target: TargetRef, payload: QueueEventPayload) -> usize {
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);

        let Some(channel) = self.inner.targets.get(&target) else {
            return 0;
        };
        let mut state = channel.state.lock();
        state.sequence += 1;
        let event = QueueEvent {
            target_id: target.target_id,
            target_type: target.target_type,
            sequence: state.sequence,
            published_at: Utc::now(),
            payload,
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for (id, sender) in &state.subscribers {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        queue = %target,
                        subscriber = %id,
                        buffer = self.inner.subscriber_buffer,
                        "Subscriber too slow; disconnecting"
                    );
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }
        for id in &dropped {
            state.subscribers.remove(id);
        }
        self.inner
            .subscribers_dropped
            .fetch_add(dropped.len() as u64, Ordering::Relaxed);

        debug!(
            queue = %target,
            event = event.name(),
            sequence = event.sequence,
            delivered,
            "Published queue event"
        );
        delivered
    }

    pub fn publish_entry_update(&self, previous_status: EntryStatus, entry: &QueueEntry) -> usize {
        self.publish(
            entry.target(),
            QueueEventPayload::EntryUpdated {
                previous_status,
                entry: entry.clone(),
            },
        )
    }

    pub fn publish_regenerated(
        &self,
        target: TargetRef,
        generation: i64,
        entries: &[QueueEntry],
        reassigned: &[QueueEntry],
    ) -> usize {
        self.publish(
            target,
            QueueEventPayload::Regenerated {
                generation,
                entries: entries.to_vec(),
                reassigned: reassigned.iter().map(|entry| entry.id).collect(),
            },
        )
    }

    pub fn subscriber_count(&self, target: TargetRef) -> usize {
        self.inner
            .targets
            .get(&target)
            .map_or(0, |channel| channel.state.lock().subscribers.len())
    }

    pub fn stats(&self) -> PublisherStats {
        let subscribers = self
            .inner
            .targets
            .iter()
            .map(|channel| channel.state.lock().subscribers.len())
            .sum();
        PublisherStats {
            targets: self.inner.targets.len(),
            subscribers,
            events_published: self.inner.events_published.load(Ordering::Relaxed),
            subscribers_dropped: self.inner.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Live subscription handle; dropping it releases the registration.
#[derive(Debug)]
pub struct QueueSubscription {
    id: Uuid,
    target: TargetRef,
    snapshot: Option<QueueEvent>,
    receiver: mpsc::Receiver<QueueEvent>,
    inner: Arc<PublisherInner>,
}

impl QueueSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> TargetRef {
        self.target
    }

    /// Next event, or `None` once the subscriber has been disconnected.
    pub async fn next_event(&mut self) -> Option<QueueEvent> {
        if let Some(snapshot) = self.snapshot.take() {
            return Some(snapshot);
        }
        self.receiver.recv().await
    }
}

impl Stream for QueueSubscription {
    type Item = QueueEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(snapshot) = self.snapshot.take() {
            return Poll::Ready(Some(snapshot));
        }
        self.receiver.poll_recv(cx)
    }
}

impl Drop for QueueSubscription {
    fn drop(&mut self) {
        self.receiver.close();
        self.inner.unsubscribe(self.target, self.id);
    }
}
