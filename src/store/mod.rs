//! # Queue Store
//!
//! Durable, per-target ordered collection of queue entries.
//!
//! ## Write discipline
//!
//! - A regeneration is one atomic [`QueueStore::replace_generation`]: every
//!   still-open entry of the target is marked `reassigned` and the new ranked
//!   set is inserted under the next generation number. Either both happen or
//!   neither does.
//! - Single-entry mutations go through [`QueueStore::compare_and_swap`], which
//!   only applies when the stored `(status, version)` still matches what the
//!   caller read. Nothing ever locks a whole target queue.
//! - Entries are never deleted.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use thiserror::Error;

use crate::error::AutoAssignError;
use crate::models::{NewQueueEntry, QueueEntry, TargetRef};
use crate::state_machine::EntryStatus;

pub use memory::InMemoryQueueStore;
#[cfg(feature = "postgres")]
pub use postgres::PgQueueStore;

/// Reason recorded on entries invalidated by a regeneration
pub const REGENERATION_REASSIGN_REASON: &str = "regenerated";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Freelancer {freelancer_id} already has an open entry for {target}")]
    DuplicateOpenEntry { target: TargetRef, freelancer_id: i64 },

    #[error("Entry not found: {0}")]
    NotFound(i64),

    #[error("Corrupt row for entry {entry_id}: {message}")]
    CorruptRow { entry_id: i64, message: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AutoAssignError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuplicateOpenEntry {
                target,
                freelancer_id,
            } => AutoAssignError::DuplicateOpenEntry {
                target: target.to_string(),
                freelancer_id,
            },
            StoreError::NotFound(id) => AutoAssignError::EntryNotFound(id),
            StoreError::CorruptRow { .. } => AutoAssignError::Internal(error.to_string()),
            StoreError::Backend(message) => AutoAssignError::Storage(message),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of an atomic generation swap
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacedGeneration {
    pub generation: i64,
    /// Newly inserted entries, ordered by position
    pub entries: Vec<QueueEntry>,
    /// Open entries from earlier generations that were invalidated
    pub reassigned: Vec<QueueEntry>,
}

/// Outcome of a conditional single-entry write
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    Applied(QueueEntry),
    /// Stored entry no longer matches the expected `(status, version)`
    Conflict { current: QueueEntry },
    Missing,
}

/// Whose entries a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryScope {
    Freelancer(i64),
    Target(TargetRef),
}

/// Store-level listing filter; `statuses` is never empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryQuery {
    pub scope: EntryScope,
    pub statuses: Vec<EntryStatus>,
}

impl EntryQuery {
    pub fn matches(&self, entry: &QueueEntry) -> bool {
        let in_scope = match self.scope {
            EntryScope::Freelancer(id) => entry.freelancer_id == id,
            EntryScope::Target(target) => entry.target() == target,
        };
        in_scope && self.statuses.contains(&entry.status)
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync + Debug {
    /// Invalidate every open entry of `target` and insert `drafts` as the
    /// next generation, atomically.
    async fn replace_generation(
        &self,
        target: TargetRef,
        drafts: Vec<NewQueueEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<ReplacedGeneration>;

    async fn get_entry(&self, entry_id: i64) -> StoreResult<Option<QueueEntry>>;

    /// Write `updated` only if the stored entry still has `expected_status`
    /// and `expected_version`.
    async fn compare_and_swap(
        &self,
        updated: &QueueEntry,
        expected_status: EntryStatus,
        expected_version: i64,
    ) -> StoreResult<CasOutcome>;

    /// One page of matching entries plus the total match count.
    ///
    /// Target listings are ordered by generation (newest first) then
    /// position; freelancer listings by creation time, newest first. Ties
    /// fall back to the entry id so pages never overlap.
    async fn list_entries(
        &self,
        query: &EntryQuery,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<QueueEntry>, u64)>;

    /// `notified` entries whose deadline is at or before `now`, oldest first.
    async fn find_due_expirations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<QueueEntry>>;

    async fn current_generation(&self, target: TargetRef) -> StoreResult<Option<i64>>;

    /// Every entry of the target's current generation, by position.
    async fn current_entries(&self, target: TargetRef) -> StoreResult<Vec<QueueEntry>>;

    /// Open (`pending`/`notified`) entries of one freelancer across targets.
    async fn open_entries_for_freelancer(&self, freelancer_id: i64)
        -> StoreResult<Vec<QueueEntry>>;

    /// Entries resolved at or after `since`, optionally for one target.
    async fn resolved_since(
        &self,
        target: Option<TargetRef>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<QueueEntry>>;
}
