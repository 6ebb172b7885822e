//! # Regeneration Coordinator
//!
//! Rebuilds a target's queue with at most one regeneration in flight per
//! target.
//!
//! ## Policies
//!
//! - [`RegenerationPolicy::Reject`]: a second request while one is running
//!   fails with `RegenerationInProgress`.
//! - [`RegenerationPolicy::Supersede`]: the newer request cancels the running
//!   one and executes strictly after it has finished. The cancelled run
//!   abandons its metrics fetch and writes nothing.
//!
//! ## Failure behaviour
//!
//! The provider fetch is an idempotent read: it is wrapped in a timeout and
//! retried with backoff. The store write is one atomic generation swap wrapped
//! in a timeout and never retried. Any failure before the swap commits leaves
//! the previous generation untouched. A swap that times out is resolved by
//! re-reading the target's generation: if it advanced, the swap committed and
//! the run reports it like any other success.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use serde_json::Value;
use tracing::{info, warn};

use super::queue_builder::{BuilderConfig, QueueBuilder};
use crate::config::AutoAssignConfig;
use crate::error::{AutoAssignError, Result};
use crate::events::QueueEventPublisher;
use crate::logging::log_queue_operation;
use crate::models::{QueueEntry, TargetRef};
use crate::providers::CandidateMetricsProvider;
use crate::resilience::{retry_with_backoff, BackoffConfig};
use crate::state_machine::EntryStatus;
use crate::store::{QueueStore, ReplacedGeneration, StoreResult, REGENERATION_REASSIGN_REASON};
use crate::utils::SharedClock;

/// What to do when a regeneration is requested while one is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationPolicy {
    #[default]
    Reject,
    Supersede,
}

/// Timeouts and retry budget for one regeneration
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationSettingsView {
    pub policy: RegenerationPolicy,
    pub provider_timeout: Duration,
    pub store_timeout: Duration,
    pub retry: BackoffConfig,
}

impl RegenerationSettingsView {
    pub fn from_config(config: &AutoAssignConfig) -> Self {
        Self {
            policy: config.regeneration.policy,
            provider_timeout: config.regeneration.provider_timeout(),
            store_timeout: config.regeneration.store_timeout(),
            retry: config.retry.clone(),
        }
    }
}

/// Result of a committed regeneration
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationOutcome {
    pub target: TargetRef,
    pub generation: i64,
    pub entries: Vec<QueueEntry>,
    pub reassigned: Vec<QueueEntry>,
    pub candidates_considered: usize,
    pub reserved_newcomer: Option<i64>,
}

#[derive(Debug)]
struct RunToken {
    run_id: u64,
    cancel: watch::Sender<bool>,
}

/// Per-target serialization point
#[derive(Debug, Default)]
struct TargetSlot {
    running: AsyncMutex<()>,
    /// Runs that are executing or waiting for `running`
    runs: parking_lot::Mutex<Vec<RunToken>>,
}

impl TargetSlot {
    /// Register a run, optionally cancelling every run registered before it.
    fn register(&self, run_id: u64, cancel_previous: bool) -> watch::Receiver<bool> {
        let (cancel, receiver) = watch::channel(false);
        let mut runs = self.runs.lock();
        if cancel_previous {
            for previous in runs.iter() {
                let _ = previous.cancel.send(true);
            }
        }
        runs.push(RunToken { run_id, cancel });
        receiver
    }

    /// Signal cancellation to every registered run; returns how many there were.
    fn cancel_all(&self) -> usize {
        let runs = self.runs.lock();
        for run in runs.iter() {
            let _ = run.cancel.send(true);
        }
        runs.len()
    }

    fn finish(&self, run_id: u64) {
        self.runs.lock().retain(|token| token.run_id != run_id);
    }
}

#[derive(Debug)]
pub struct RegenerationCoordinator {
    builder: QueueBuilder,
    provider: Arc<dyn CandidateMetricsProvider>,
    store: Arc<dyn QueueStore>,
    publisher: QueueEventPublisher,
    clock: SharedClock,
    settings: RegenerationSettingsView,
    slots: DashMap<TargetRef, Arc<TargetSlot>>,
    next_run_id: AtomicU64,
}

impl RegenerationCoordinator {
    pub fn new(
        builder: QueueBuilder,
        provider: Arc<dyn CandidateMetricsProvider>,
        store: Arc<dyn QueueStore>,
        publisher: QueueEventPublisher,
        clock: SharedClock,
        settings: RegenerationSettingsView,
    ) -> Self {
        Self {
            builder,
            provider,
            store,
            publisher,
            clock,
            settings,
            slots: DashMap::new(),
            next_run_id: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> RegenerationPolicy {
        self.settings.policy
    }

    fn slot(&self, target: TargetRef) -> Arc<TargetSlot> {
        self.slots.entry(target).or_default().clone()
    }

    /// Regenerate `target` with the configured policy.
    pub async fn regenerate(
        &self,
        target: TargetRef,
        config: &BuilderConfig,
    ) -> Result<RegenerationOutcome> {
        self.regenerate_with_policy(target, config, self.settings.policy)
            .await
    }

    pub async fn regenerate_with_policy(
        &self,
        target: TargetRef,
        config: &BuilderConfig,
        policy: RegenerationPolicy,
    ) -> Result<RegenerationOutcome> {
        // Reject bad input before touching any in-flight run
        config.validate(self.builder.max_limit())?;

        let slot = self.slot(target);
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);

        let (_guard, mut cancel) = match policy {
            RegenerationPolicy::Reject => {
                let guard = slot.running.try_lock().map_err(|_| {
                    AutoAssignError::RegenerationInProgress {
                        target: target.to_string(),
                    }
                })?;
                (guard, slot.register(run_id, false))
            }
            RegenerationPolicy::Supersede => {
                let cancel = slot.register(run_id, true);
                (slot.running.lock().await, cancel)
            }
        };

        let result = self.run(target, config, &mut cancel).await;
        slot.finish(run_id);

        match &result {
            Ok(outcome) => log_queue_operation(
                "regenerate",
                Some(target.target_type.as_str()),
                Some(target.target_id),
                Some(outcome.generation),
                "committed",
                None,
            ),
            Err(AutoAssignError::Cancelled { .. }) => {
                info!(queue = %target, run_id, "Regeneration superseded before commit");
            }
            Err(error) => {
                warn!(queue = %target, run_id, error = %error, "Regeneration failed; previous generation kept");
            }
        }
        result
    }

    /// Cancel the running regeneration for `target` and any waiting behind it.
    ///
    /// Returns whether there was one to cancel. A run that has already begun
    /// its store write completes normally.
    pub fn cancel_regeneration(&self, target: TargetRef) -> bool {
        let Some(slot) = self.slots.get(&target).map(|slot| slot.clone()) else {
            return false;
        };
        slot.cancel_all() > 0
    }

    /// Whether a regeneration for `target` currently holds the write slot
    pub fn is_running(&self, target: TargetRef) -> bool {
        self.slots
            .get(&target)
            .is_some_and(|slot| slot.running.try_lock().is_err())
    }

    async fn run(
        &self,
        target: TargetRef,
        config: &BuilderConfig,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<RegenerationOutcome> {
        let cancelled = || AutoAssignError::Cancelled {
            target: target.to_string(),
        };
        if *cancel.borrow() {
            return Err(cancelled());
        }

        let provider_timeout = self.settings.provider_timeout;
        let provider = &self.provider;
        let fetch = retry_with_backoff("get_eligible_candidates", &self.settings.retry, || async move {
            tokio::time::timeout(provider_timeout, provider.get_eligible_candidates(target))
                .await
                .map_err(|_| {
                    AutoAssignError::Timeout(format!(
                        "candidate metrics for {target} after {}ms",
                        provider_timeout.as_millis()
                    ))
                })?
        });

        // Dropping `fetch` abandons the in-flight provider call
        let candidates = tokio::select! {
            biased;
            _ = wait_for_cancel(cancel) => return Err(cancelled()),
            fetched = fetch => fetched?,
        };

        let now = self.clock.now();
        let built = self.builder.rank_candidates(target, candidates, config, now)?;

        let _permit = self.publisher.begin_commit(target).await;
        if *cancel.borrow() {
            return Err(cancelled());
        }

        let previous = self
            .read_store("current_generation", self.store.current_generation(target))
            .await?;
        let replaced = match tokio::time::timeout(
            self.settings.store_timeout,
            self.store.replace_generation(target, built.drafts, now),
        )
        .await
        {
            Ok(replaced) => replaced?,
            Err(_) => self.resolve_timed_out_swap(target, previous, now).await?,
        };

        self.publisher.publish_regenerated(
            target,
            replaced.generation,
            &replaced.entries,
            &replaced.reassigned,
        );

        Ok(RegenerationOutcome {
            target,
            generation: replaced.generation,
            entries: replaced.entries,
            reassigned: replaced.reassigned,
            candidates_considered: built.candidates_considered,
            reserved_newcomer: built.reserved_newcomer,
        })
    }

    /// Learn whether a timed-out swap committed. Only this run can advance the
    /// generation while it holds the slot, so an advance is its own write.
    async fn resolve_timed_out_swap(
        &self,
        target: TargetRef,
        previous: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ReplacedGeneration> {
        let store_timeout = self.settings.store_timeout;
        warn!(
            queue = %target,
            timeout_ms = store_timeout.as_millis() as u64,
            "Generation swap timed out, re-reading target"
        );

        let current = self
            .read_store("current_generation", self.store.current_generation(target))
            .await?;
        let generation = match current {
            Some(generation) if current != previous => generation,
            _ => {
                return Err(AutoAssignError::Timeout(format!(
                    "queue store write for {target} after {}ms; previous generation kept",
                    store_timeout.as_millis()
                )))
            }
        };

        let entries = self
            .read_store("current_entries", self.store.current_entries(target))
            .await?;
        let reassigned = self
            .read_store("resolved_since", self.store.resolved_since(Some(target), now))
            .await?
            .into_iter()
            .filter(|entry| {
                entry.status == EntryStatus::Reassigned
                    && Some(entry.generation) == previous
                    && entry.metadata.get("reassignReason").and_then(Value::as_str)
                        == Some(REGENERATION_REASSIGN_REASON)
            })
            .collect();

        info!(queue = %target, generation, "Timed-out generation swap had committed");
        Ok(ReplacedGeneration {
            generation,
            entries,
            reassigned,
        })
    }

    async fn read_store<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        tokio::time::timeout(self.settings.store_timeout, future)
            .await
            .map_err(|_| {
                AutoAssignError::Timeout(format!(
                    "{operation} after {}ms",
                    self.settings.store_timeout.as_millis()
                ))
            })?
            .map_err(AutoAssignError::from)
    }
}

/// Resolve once cancellation is signalled; never resolves if the sender is gone.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
