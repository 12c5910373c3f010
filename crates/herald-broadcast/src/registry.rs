use std::collections::HashSet;

use dashmap::DashMap;
use tracing::debug;

use herald_core::types::{Destination, DestinationId};
use herald_transport::{TaskHandle, Transport, TransportFacade};

/// Shared in-memory destination list with per-entry throttle state.
///
/// Backed by a concurrent map so the run loop, the control-side ticker, and
/// refresh can touch entries without a registry-wide lock. Staleness between
/// those writers only costs scheduling efficiency — `snapshot` re-reads the
/// map on every pass.
#[derive(Default)]
pub struct DestinationRegistry {
    inner: DashMap<DestinationId, Destination>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the transport for a fresh destination list.
    ///
    /// Delegates to the facade; the caller polls the handle and feeds the
    /// outcome to [`apply_refresh`](Self::apply_refresh).
    pub fn begin_refresh<C: Transport + 'static>(
        &self,
        facade: &TransportFacade<C>,
    ) -> TaskHandle<Vec<Destination>> {
        facade.list_destinations()
    }

    /// Replace the whole list with `fetched`, merging the operator denylist.
    ///
    /// Cooldown state belongs to the running job and the ticker, not to
    /// refresh: an entry that survives the refresh keeps its remaining
    /// cooldown. Returns the new entry count.
    pub fn apply_refresh(&self, fetched: Vec<Destination>, denylist: &HashSet<DestinationId>) -> usize {
        let carried: Vec<(DestinationId, u32)> = self
            .inner
            .iter()
            .filter(|e| e.cooldown_remaining_secs > 0)
            .map(|e| (e.id, e.cooldown_remaining_secs))
            .collect();

        self.inner.clear();
        let mut count = 0usize;
        for mut dest in fetched {
            dest.excluded = denylist.contains(&dest.id);
            if let Some((_, remaining)) = carried.iter().find(|(id, _)| *id == dest.id) {
                dest.cooldown_remaining_secs = *remaining;
            }
            self.inner.insert(dest.id, dest);
            count += 1;
        }
        debug!(destinations = count, "registry refreshed");
        count
    }

    /// One-second ticker: decrement every active cooldown.
    pub fn tick(&self) {
        for mut entry in self.inner.iter_mut() {
            if entry.cooldown_remaining_secs > 0 {
                entry.cooldown_remaining_secs -= 1;
            }
        }
    }

    /// Clones of the sendable destinations among `ids`, in id order given.
    ///
    /// Ids missing from the registry (e.g. dropped by a refresh mid-run)
    /// simply produce no entry.
    pub fn snapshot(&self, ids: &[DestinationId]) -> Vec<Destination> {
        ids.iter()
            .filter_map(|id| self.inner.get(id).map(|e| e.value().clone()))
            .filter(|d| d.sendable())
            .collect()
    }

    /// Re-arm the declared cooldown after a successful send.
    pub fn mark_sent(&self, id: DestinationId) {
        if let Some(mut entry) = self.inner.get_mut(&id) {
            entry.cooldown_remaining_secs = entry.declared_cooldown_secs;
        }
    }

    /// Apply a transport-signalled wait.
    pub fn throttle(&self, id: DestinationId, wait_secs: u32) {
        if let Some(mut entry) = self.inner.get_mut(&id) {
            entry.cooldown_remaining_secs = wait_secs;
        }
    }

    pub fn get(&self, id: DestinationId) -> Option<Destination> {
        self.inner.get(&id).map(|e| e.value().clone())
    }

    /// All destinations, destinations closest to being unblocked first.
    pub fn all(&self) -> Vec<Destination> {
        let mut list: Vec<Destination> = self.inner.iter().map(|e| e.value().clone()).collect();
        list.sort_by(|a, b| {
            a.cooldown_remaining_secs
                .cmp(&b.cooldown_remaining_secs)
                .then_with(|| a.title.cmp(&b.title))
        });
        list
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
