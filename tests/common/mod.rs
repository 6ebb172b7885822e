#![allow(dead_code)]

pub mod strategies;

pub use strategies::*;

use async_trait::async_trait;
use autoassign_core::config::AutoAssignConfig;
use autoassign_core::models::{CandidateMetrics, NewQueueEntry, QueueEntry, TargetRef, TargetType};
use autoassign_core::orchestration::AutoAssignEngine;
use autoassign_core::providers::StaticMetricsProvider;
use autoassign_core::state_machine::EntryStatus;
use autoassign_core::store::{
    CasOutcome, EntryQuery, InMemoryQueueStore, QueueStore, ReplacedGeneration, StoreResult,
};
use autoassign_core::utils::{Clock, ManualClock};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Fixed start instant so expiry arithmetic is reproducible
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn project(id: i64) -> TargetRef {
    TargetRef::new(TargetType::Project, id)
}

/// Builder for test candidates with neutral defaults
#[derive(Debug, Clone)]
pub struct CandidateBuilder {
    metrics: CandidateMetrics,
}

impl CandidateBuilder {
    pub fn new(freelancer_id: i64) -> Self {
        Self {
            metrics: CandidateMetrics {
                freelancer_id,
                last_assignment_at: None,
                rating: 3.0,
                completion_rate: 0.5,
                earnings_balance: 0.0,
                active_assignment_count: 0,
                is_newcomer: false,
            },
        }
    }

    pub fn rating(mut self, rating: f64) -> Self {
        self.metrics.rating = rating;
        self
    }

    pub fn newcomer(mut self) -> Self {
        self.metrics.is_newcomer = true;
        self
    }

    pub fn active_assignments(mut self, count: u32) -> Self {
        self.metrics.active_assignment_count = count;
        self
    }

    pub fn last_assigned(mut self, at: DateTime<Utc>) -> Self {
        self.metrics.last_assignment_at = Some(at);
        self
    }

    pub fn build(self) -> CandidateMetrics {
        self.metrics
    }
}

/// Engine over an in-memory store, a static provider and a manual clock
pub struct TestEngine {
    pub engine: Arc<AutoAssignEngine>,
    pub store: Arc<InMemoryQueueStore>,
    pub provider: Arc<StaticMetricsProvider>,
    pub clock: ManualClock,
}

impl TestEngine {
    pub fn new(config: AutoAssignConfig) -> Self {
        let store = Arc::new(InMemoryQueueStore::new());
        Self::over_store(config, store.clone(), store)
    }

    /// Engine writing through a [`StallingStore`] around `store`
    pub fn stalling(config: AutoAssignConfig) -> (Self, Arc<StallingStore>) {
        let store = Arc::new(InMemoryQueueStore::new());
        let stalling = Arc::new(StallingStore::new(store.clone()));
        (Self::over_store(config, stalling.clone(), store), stalling)
    }

    fn over_store(
        config: AutoAssignConfig,
        backend: Arc<dyn QueueStore>,
        store: Arc<InMemoryQueueStore>,
    ) -> Self {
        let provider = Arc::new(StaticMetricsProvider::new());
        let clock = ManualClock::new(epoch());
        let engine = AutoAssignEngine::builder(config)
            .store(backend)
            .provider(provider.clone())
            .clock(Arc::new(clock.clone()))
            .build()
            .expect("engine should build from a valid config");
        Self {
            engine: Arc::new(engine),
            store,
            provider,
            clock,
        }
    }

    /// Default config with rating as the only weighted factor and no
    /// newcomer reservation, so orderings follow ratings exactly.
    pub fn rating_only() -> Self {
        Self::new(Self::rating_only_config())
    }

    pub fn rating_only_config() -> AutoAssignConfig {
        let mut config = AutoAssignConfig::default();
        config.builder.weights = autoassign_core::ScoringWeights::zero()
            .with(autoassign_core::scoring::WeightFactor::Rating, 1.0);
        config.builder.fairness.ensure_newcomer = false;
        config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn with_candidates(self, target: TargetRef, candidates: Vec<CandidateMetrics>) -> Self {
        self.provider.set_candidates(target, candidates);
        self
    }

    /// Candidates `1..=count` with ratings descending from 5.0
    pub fn ranked_candidates(count: i64) -> Vec<CandidateMetrics> {
        (1..=count)
            .map(|id| {
                CandidateBuilder::new(id)
                    .rating(5.0 - (id - 1) as f64 * (4.0 / count.max(1) as f64))
                    .build()
            })
            .collect()
    }
}

/// Store that stalls its caller after chosen writes have committed, or before
/// reads return, while passing everything through to an in-memory store.
#[derive(Debug)]
pub struct StallingStore {
    inner: Arc<InMemoryQueueStore>,
    after_swap: Mutex<Option<Duration>>,
    after_cas: Mutex<Option<(EntryStatus, Duration)>>,
    before_snapshot: Mutex<Option<Duration>>,
}

impl StallingStore {
    pub fn new(inner: Arc<InMemoryQueueStore>) -> Self {
        Self {
            inner,
            after_swap: Mutex::new(None),
            after_cas: Mutex::new(None),
            before_snapshot: Mutex::new(None),
        }
    }

    /// Stall after a generation swap has committed
    pub fn stall_after_swap(&self, delay: Option<Duration>) {
        *self.after_swap.lock() = delay;
    }

    /// Stall after a conditional write into `status` has committed
    pub fn stall_after_write_to(&self, status: EntryStatus, delay: Duration) {
        *self.after_cas.lock() = Some((status, delay));
    }

    /// Stall current-generation reads
    pub fn stall_snapshots(&self, delay: Option<Duration>) {
        *self.before_snapshot.lock() = delay;
    }
}

#[async_trait]
impl QueueStore for StallingStore {
    async fn replace_generation(
        &self,
        target: TargetRef,
        drafts: Vec<NewQueueEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<ReplacedGeneration> {
        let replaced = self.inner.replace_generation(target, drafts, now).await?;
        let delay = *self.after_swap.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(replaced)
    }

    async fn get_entry(&self, entry_id: i64) -> StoreResult<Option<QueueEntry>> {
        self.inner.get_entry(entry_id).await
    }

    async fn compare_and_swap(
        &self,
        updated: &QueueEntry,
        expected_status: EntryStatus,
        expected_version: i64,
    ) -> StoreResult<CasOutcome> {
        let outcome = self
            .inner
            .compare_and_swap(updated, expected_status, expected_version)
            .await?;
        let stall = *self.after_cas.lock();
        if let (CasOutcome::Applied(stored), Some((status, delay))) = (&outcome, stall) {
            if stored.status == status {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(outcome)
    }

    async fn list_entries(
        &self,
        query: &EntryQuery,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<QueueEntry>, u64)> {
        self.inner.list_entries(query, offset, limit).await
    }

    async fn find_due_expirations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<QueueEntry>> {
        self.inner.find_due_expirations(now, limit).await
    }

    async fn current_generation(&self, target: TargetRef) -> StoreResult<Option<i64>> {
        self.inner.current_generation(target).await
    }

    async fn current_entries(&self, target: TargetRef) -> StoreResult<Vec<QueueEntry>> {
        let delay = *self.before_snapshot.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.current_entries(target).await
    }

    async fn open_entries_for_freelancer(
        &self,
        freelancer_id: i64,
    ) -> StoreResult<Vec<QueueEntry>> {
        self.inner.open_entries_for_freelancer(freelancer_id).await
    }

    async fn resolved_since(
        &self,
        target: Option<TargetRef>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<QueueEntry>> {
        self.inner.resolved_since(target, since).await
    }
}
