//! # Candidate Metrics Providers
//!
//! The engine does not compute ratings, completion rates or earnings itself.
//! It asks a [`CandidateMetricsProvider`] for the eligible candidates of a
//! target and scores whatever comes back.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{AutoAssignError, Result};
use crate::models::{CandidateMetrics, TargetRef};

/// Source of per-freelancer signals for a target
///
/// Implementations perform external I/O. Callers wrap every call in a timeout
/// and may abandon it at any await point, so implementations must not leave
/// partial side effects behind when dropped.
#[async_trait]
pub trait CandidateMetricsProvider: Send + Sync + Debug {
    /// Eligible candidates for `target`.
    ///
    /// Returns [`AutoAssignError::TargetNotFound`] for unknown targets and
    /// [`AutoAssignError::ProviderUnavailable`] for transient failures.
    async fn get_eligible_candidates(&self, target: TargetRef) -> Result<Vec<CandidateMetrics>>;
}

/// In-memory provider backed by a fixed candidate list per target
///
/// Supports an artificial delay and injected failures so regeneration
/// timeouts, cancellation and retries can be exercised without a network.
#[derive(Debug, Default)]
pub struct StaticMetricsProvider {
    candidates: DashMap<TargetRef, Vec<CandidateMetrics>>,
    delay: Mutex<Option<Duration>>,
    failures_remaining: AtomicU32,
    calls: AtomicU64,
}

impl StaticMetricsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(target: TargetRef, candidates: Vec<CandidateMetrics>) -> Self {
        let provider = Self::new();
        provider.set_candidates(target, candidates);
        provider
    }

    pub fn set_candidates(&self, target: TargetRef, candidates: Vec<CandidateMetrics>) {
        self.candidates.insert(target, candidates);
    }

    /// Sleep this long before answering every call
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Fail the next `count` calls with `ProviderUnavailable`
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateMetricsProvider for StaticMetricsProvider {
    async fn get_eligible_candidates(&self, target: TargetRef) -> Result<Vec<CandidateMetrics>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(AutoAssignError::ProviderUnavailable(format!(
                "injected failure for {target}"
            )));
        }

        let candidates = self
            .candidates
            .get(&target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AutoAssignError::TargetNotFound(target.to_string()))?;

        debug!(queue = %target, candidates = candidates.len(), "Loaded candidate metrics");
        Ok(candidates)
    }
}
