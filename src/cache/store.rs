//! Process-wide query cache.
//!
//! Every operation takes the store lock once and releases it before
//! returning, so a patch is observed either completely or not at all. The
//! lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::keys::{KeyPattern, QueryKey};
use crate::cache::patch::CachePatch;

/// Pre-image held for one optimistic write that has not settled yet.
#[derive(Debug)]
struct PendingWrite {
    /// Version the optimistic write produced; identifies it in the chain.
    version: u64,
    previous: Value,
    /// A later write on the entry committed, so restoring `previous` would
    /// drop an accepted change.
    covered: bool,
}

#[derive(Debug, Default)]
struct CacheEntry {
    data: Option<Value>,
    stale: bool,
    /// Store-wide write counter value of the last data write.
    version: u64,
    /// Bumped by every fetch start, cancellation and invalidation.
    fetch_generation: u64,
    fetching: bool,
    /// Unsettled optimistic writes, oldest first.
    pending: Vec<PendingWrite>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    writes: u64,
}

impl CacheState {
    fn write(&mut self, key: &QueryKey, data: Option<Value>) -> u64 {
        self.writes += 1;
        let version = self.writes;
        let entry = self.entries.entry(key.clone()).or_default();
        entry.data = data;
        entry.version = version;
        version
    }

    /// Writes server-side data; pre-images of unsettled optimistic writes no
    /// longer describe the entry and are dropped.
    fn replace(&mut self, key: &QueryKey, data: Value) -> u64 {
        let version = self.write(key, Some(data));
        if let Some(entry) = self.entries.get_mut(key) {
            entry.stale = false;
            if !entry.pending.is_empty() {
                log::debug!(
                    "Dropping {} pending rollbacks of {key}: replaced by fresh data",
                    entry.pending.len()
                );
                entry.pending.clear();
            }
        }
        version
    }

    /// Records an optimistic write and its pre-image.
    fn write_optimistic(&mut self, key: &QueryKey, previous: Value, next: Value) -> u64 {
        let version = self.write(key, Some(next));
        if let Some(entry) = self.entries.get_mut(key) {
            entry.pending.push(PendingWrite {
                version,
                previous,
                covered: false,
            });
        }
        version
    }

    fn matching<'a>(
        &'a mut self,
        pattern: &'a KeyPattern,
    ) -> impl Iterator<Item = (&'a QueryKey, &'a mut CacheEntry)> + 'a {
        self.entries
            .iter_mut()
            .filter(move |(key, _)| pattern.matches(key))
    }
}

/// Pre-image of one entry touched by an optimistic write.
#[derive(Clone, Debug, PartialEq)]
pub struct EntrySnapshot {
    pub key: QueryKey,
    pub previous: Value,
    /// Version the optimistic write produced.
    pub written_version: u64,
}

/// Result of [`QueryCache::apply`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppliedPatch {
    pub detail: Option<EntrySnapshot>,
    pub lists: Vec<EntrySnapshot>,
}

impl AppliedPatch {
    pub fn snapshots(&self) -> impl Iterator<Item = &EntrySnapshot> {
        self.detail.iter().chain(self.lists.iter())
    }

    pub fn touched(&self) -> usize {
        self.lists.len() + usize::from(self.detail.is_some())
    }
}

/// Handle of an in-flight fetch; results are only accepted while the
/// entry's generation still equals the ticket's.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: QueryKey,
    generation: u64,
}

/// Shared handle to the query cache.
#[derive(Clone, Debug, Default)]
pub struct QueryCache {
    state: Arc<Mutex<CacheState>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_query_data(&self, key: &QueryKey) -> Option<Value> {
        self.state
            .lock()
            .entries
            .get(key)
            .and_then(|entry| entry.data.clone())
    }

    /// Every cached value whose key matches `pattern`.
    pub fn get_queries_data(&self, pattern: &KeyPattern) -> Vec<(QueryKey, Value)> {
        let mut state = self.state.lock();
        let mut found: Vec<(QueryKey, Value)> = state
            .matching(pattern)
            .filter_map(|(key, entry)| entry.data.clone().map(|data| (key.clone(), data)))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Writes `data` and marks the entry fresh. Returns the new version.
    pub fn set_query_data(&self, key: &QueryKey, data: Value) -> u64 {
        self.state.lock().replace(key, data)
    }

    pub fn version(&self, key: &QueryKey) -> Option<u64> {
        self.state.lock().entries.get(key).map(|entry| entry.version)
    }

    /// Missing entries count as stale.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_none_or(|entry| entry.stale || entry.data.is_none())
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.fetching)
    }

    /// Marks matching entries stale and cancels their in-flight fetches.
    ///
    /// Repeated calls leave the store in the same state. Returns the number
    /// of matching entries.
    pub fn invalidate_queries(&self, pattern: &KeyPattern) -> usize {
        let mut state = self.state.lock();
        let mut count = 0;
        for (_, entry) in state.matching(pattern) {
            entry.stale = true;
            if entry.fetching {
                entry.fetching = false;
                entry.fetch_generation += 1;
            }
            count += 1;
        }
        log::debug!("Invalidated {count} cache entries matching {pattern}");
        count
    }

    /// Cancels in-flight fetches of matching entries; their results will be
    /// discarded. Returns the number of fetches cancelled.
    pub fn cancel_queries(&self, pattern: &KeyPattern) -> usize {
        let mut state = self.state.lock();
        let mut count = 0;
        for (_, entry) in state.matching(pattern) {
            if entry.fetching {
                entry.fetching = false;
                entry.fetch_generation += 1;
                count += 1;
            }
        }
        if count > 0 {
            log::debug!("Cancelled {count} in-flight fetches matching {pattern}");
        }
        count
    }

    /// Registers a fetch for `key`, superseding any fetch already running.
    pub fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
        let mut state = self.state.lock();
        let entry = state.entries.entry(key.clone()).or_default();
        entry.fetch_generation += 1;
        entry.fetching = true;
        FetchTicket {
            key: key.clone(),
            generation: entry.fetch_generation,
        }
    }

    /// Stores a fetch result unless the fetch was cancelled or superseded.
    /// Returns whether the result was accepted.
    pub fn complete_fetch(&self, ticket: &FetchTicket, data: Value) -> bool {
        let mut state = self.state.lock();
        let current = state
            .entries
            .get(&ticket.key)
            .is_some_and(|entry| entry.fetching && entry.fetch_generation == ticket.generation);
        if !current {
            log::debug!("Discarding stale fetch result for {}", ticket.key);
            return false;
        }
        state.replace(&ticket.key, data);
        if let Some(entry) = state.entries.get_mut(&ticket.key) {
            entry.fetching = false;
        }
        true
    }

    /// Ends a failed fetch without touching the cached data.
    pub fn fail_fetch(&self, ticket: &FetchTicket) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(&ticket.key) {
            if entry.fetch_generation == ticket.generation {
                entry.fetching = false;
            }
        }
    }

    /// Applies a patch atomically, returning the pre-image of every entry it
    /// wrote. Entries without cached data are left alone.
    pub fn apply(&self, patch: CachePatch) -> AppliedPatch {
        let mut state = self.state.lock();
        let mut applied = AppliedPatch::default();

        if let Some(detail) = patch.detail {
            let previous = state
                .entries
                .get(&detail.key)
                .and_then(|entry| entry.data.clone());
            if let Some(previous) = previous {
                if let Some(next) = (detail.update)(&previous) {
                    let written_version =
                        state.write_optimistic(&detail.key, previous.clone(), next);
                    applied.detail = Some(EntrySnapshot {
                        key: detail.key,
                        previous,
                        written_version,
                    });
                }
            }
        }

        if let Some(sweep) = patch.list_sweep {
            let rewrites: Vec<(QueryKey, Value, Value)> = state
                .matching(&sweep.pattern)
                .filter_map(|(key, entry)| {
                    let previous = entry.data.as_ref()?;
                    sweep
                        .sweep(previous)
                        .map(|next| (key.clone(), previous.clone(), next))
                })
                .collect();
            for (key, previous, next) in rewrites {
                let written_version = state.write_optimistic(&key, previous.clone(), next);
                applied.lists.push(EntrySnapshot {
                    key,
                    previous,
                    written_version,
                });
            }
            applied.lists.sort_by(|a, b| a.key.cmp(&b.key));
        }

        applied
    }

    /// Rolls back the optimistic writes behind `snapshots`.
    ///
    /// An entry is restored only when the failed write is the newest one
    /// still pending on it. When a later optimistic write is stacked on
    /// top, the pre-image is handed to that write instead, so whichever
    /// write fails last restores the state from before the first one.
    /// Entries refreshed from the server since, or covered by a later
    /// committed write, are left alone. Returns the number of entries
    /// restored.
    pub fn restore<'a, I>(&self, snapshots: I) -> usize
    where
        I: IntoIterator<Item = &'a EntrySnapshot>,
    {
        let mut state = self.state.lock();
        let mut restored = 0;
        for snapshot in snapshots {
            let Some(entry) = state.entries.get_mut(&snapshot.key) else {
                continue;
            };
            let Some(position) = entry
                .pending
                .iter()
                .position(|write| write.version == snapshot.written_version)
            else {
                log::warn!(
                    "Skipping rollback of {}: entry was refreshed after the optimistic write",
                    snapshot.key
                );
                continue;
            };

            let write = entry.pending.remove(position);
            if write.covered {
                log::warn!(
                    "Skipping rollback of {}: a later write on it was committed",
                    snapshot.key
                );
                continue;
            }
            if let Some(later) = entry.pending.get_mut(position) {
                log::debug!(
                    "Handing rollback of {} to a later pending write",
                    snapshot.key
                );
                later.previous = write.previous;
                continue;
            }

            state.write(&snapshot.key, Some(write.previous));
            restored += 1;
        }
        restored
    }

    /// Settles the optimistic writes behind `snapshots` as accepted.
    ///
    /// Older writes still pending on the same entries can no longer be
    /// rolled back without dropping the accepted change.
    pub fn release<'a, I>(&self, snapshots: I)
    where
        I: IntoIterator<Item = &'a EntrySnapshot>,
    {
        let mut state = self.state.lock();
        for snapshot in snapshots {
            let Some(entry) = state.entries.get_mut(&snapshot.key) else {
                continue;
            };
            if let Some(position) = entry
                .pending
                .iter()
                .position(|write| write.version == snapshot.written_version)
            {
                entry.pending.remove(position);
                for older in &mut entry.pending[..position] {
                    older.covered = true;
                }
            }
        }
    }
}
