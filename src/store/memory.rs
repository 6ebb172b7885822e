//! In-memory queue store.
//!
//! All state lives behind one `parking_lot::RwLock`. Each trait method takes
//! the lock once and never across an await, so every call is atomic and reads
//! are only ever blocked for the duration of a single write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use super::{
    CasOutcome, EntryQuery, EntryScope, QueueStore, ReplacedGeneration, StoreError, StoreResult,
    REGENERATION_REASSIGN_REASON,
};
use crate::models::{NewQueueEntry, QueueEntry, TargetRef};
use crate::state_machine::{EntryEvent, EntryStateMachine, EntryStatus};

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<i64, QueueEntry>,
    next_id: i64,
    generations: HashMap<TargetRef, i64>,
    /// (target, freelancer) -> id of the single open entry
    open_index: HashMap<(TargetRef, i64), i64>,
}

impl StoreState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn reindex(&mut self, entry: &QueueEntry) {
        let key = (entry.target(), entry.freelancer_id);
        if entry.status.is_open() {
            self.open_index.insert(key, entry.id);
        } else if self.open_index.get(&key) == Some(&entry.id) {
            self.open_index.remove(&key);
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    state: RwLock<StoreState>,
    write_delay: Mutex<Option<Duration>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied before every generation swap; used to exercise store timeouts
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    /// Insert an entry image directly, bypassing generation bookkeeping.
    ///
    /// Intended for fixtures that need an entry in an arbitrary state.
    pub fn insert_raw(&self, mut entry: QueueEntry) -> QueueEntry {
        let mut state = self.state.write();
        if entry.id <= 0 {
            entry.id = state.allocate_id();
        } else if entry.id > state.next_id {
            state.next_id = entry.id;
        }
        let generation = state.generations.entry(entry.target()).or_insert(0);
        *generation = (*generation).max(entry.generation);
        state.reindex(&entry);
        state.entries.insert(entry.id, entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sort_for_scope(entries: &mut [QueueEntry], scope: EntryScope) {
    match scope {
        EntryScope::Target(_) => {
            entries.sort_by_key(|e| (Reverse(e.generation), e.position, e.id));
        }
        EntryScope::Freelancer(_) => {
            entries.sort_by_key(|e| (Reverse(e.created_at), Reverse(e.id)));
        }
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn replace_generation(
        &self,
        target: TargetRef,
        drafts: Vec<NewQueueEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<ReplacedGeneration> {
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut seen = HashSet::new();
        for draft in &drafts {
            if draft.target() != target {
                return Err(StoreError::Backend(format!(
                    "draft for {} submitted to {target}",
                    draft.target()
                )));
            }
            if !seen.insert(draft.freelancer_id) {
                return Err(StoreError::DuplicateOpenEntry {
                    target,
                    freelancer_id: draft.freelancer_id,
                });
            }
        }

        let mut state = self.state.write();

        let open_ids: Vec<i64> = state
            .open_index
            .iter()
            .filter(|((t, _), _)| *t == target)
            .map(|(_, id)| *id)
            .collect();

        let reassign = EntryEvent::Reassign {
            reason: REGENERATION_REASSIGN_REASON.to_string(),
        };
        let mut reassigned = Vec::with_capacity(open_ids.len());
        for id in open_ids {
            let current = state.entries.get(&id).ok_or(StoreError::NotFound(id))?;
            let next = EntryStateMachine::apply(current, &reassign, None, now).map_err(|e| {
                StoreError::CorruptRow {
                    entry_id: id,
                    message: e.to_string(),
                }
            })?;
            reassigned.push(next);
        }
        for entry in &reassigned {
            state.reindex(entry);
            state.entries.insert(entry.id, entry.clone());
        }

        let generation = state.generations.get(&target).copied().unwrap_or(0) + 1;
        state.generations.insert(target, generation);

        let mut entries = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = state.allocate_id();
            let entry = draft.into_entry(id, generation, now);
            state.reindex(&entry);
            state.entries.insert(id, entry.clone());
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.position);

        Ok(ReplacedGeneration {
            generation,
            entries,
            reassigned,
        })
    }

    async fn get_entry(&self, entry_id: i64) -> StoreResult<Option<QueueEntry>> {
        Ok(self.state.read().entries.get(&entry_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        updated: &QueueEntry,
        expected_status: EntryStatus,
        expected_version: i64,
    ) -> StoreResult<CasOutcome> {
        let mut state = self.state.write();
        let Some(current) = state.entries.get(&updated.id) else {
            return Ok(CasOutcome::Missing);
        };
        if current.status != expected_status || current.version != expected_version {
            return Ok(CasOutcome::Conflict {
                current: current.clone(),
            });
        }
        state.reindex(updated);
        state.entries.insert(updated.id, updated.clone());
        Ok(CasOutcome::Applied(updated.clone()))
    }

    async fn list_entries(
        &self,
        query: &EntryQuery,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<QueueEntry>, u64)> {
        let mut matching: Vec<QueueEntry> = {
            let state = self.state.read();
            state
                .entries
                .values()
                .filter(|entry| query.matches(entry))
                .cloned()
                .collect()
        };
        sort_for_scope(&mut matching, query.scope);
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok((page, total))
    }

    async fn find_due_expirations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<QueueEntry>> {
        let mut due: Vec<QueueEntry> = {
            let state = self.state.read();
            state
                .entries
                .values()
                .filter(|entry| entry.is_past_deadline(now))
                .cloned()
                .collect()
        };
        due.sort_by_key(|e| (e.expires_at, e.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn current_generation(&self, target: TargetRef) -> StoreResult<Option<i64>> {
        Ok(self.state.read().generations.get(&target).copied())
    }

    async fn current_entries(&self, target: TargetRef) -> StoreResult<Vec<QueueEntry>> {
        let state = self.state.read();
        let Some(generation) = state.generations.get(&target).copied() else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|e| e.target() == target && e.generation == generation)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.position, e.id));
        Ok(entries)
    }

    async fn open_entries_for_freelancer(
        &self,
        freelancer_id: i64,
    ) -> StoreResult<Vec<QueueEntry>> {
        let state = self.state.read();
        Ok(state
            .entries
            .values()
            .filter(|e| e.freelancer_id == freelancer_id && e.status.is_open())
            .cloned()
            .collect())
    }

    async fn resolved_since(
        &self,
        target: Option<TargetRef>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<QueueEntry>> {
        let state = self.state.read();
        Ok(state
            .entries
            .values()
            .filter(|e| target.map_or(true, |t| e.target() == t))
            .filter(|e| e.resolved_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }
}
