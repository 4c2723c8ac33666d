use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::assignment::Assignment;

/// Append-only log of assignment events, grouped by collection.
///
/// Entries are only appended from inside a collection transaction, so for a
/// given collection the per-collection vector is already in sequence order.
pub struct AssignmentLedger {
    by_collection: DashMap<Uuid, Vec<Assignment>>,
    next_sequence: AtomicU64,
}

impl AssignmentLedger {
    pub fn new() -> Self {
        Self {
            by_collection: DashMap::new(),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Reserves the next sequence number. Rolled back transactions leave gaps.
    pub(super) fn reserve_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn append(&self, entry: Assignment) {
        self.by_collection
            .entry(entry.collection_id)
            .or_default()
            .push(entry);
    }

    pub fn latest_for(&self, collection_id: Uuid) -> Option<Assignment> {
        self.by_collection
            .get(&collection_id)
            .and_then(|entries| entries.last().cloned())
    }

    /// Oldest first.
    pub fn history_for(&self, collection_id: Uuid) -> Vec<Assignment> {
        self.by_collection
            .get(&collection_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Newest first.
    pub fn history_for_agent(&self, agent_id: Uuid) -> Vec<Assignment> {
        let mut entries: Vec<Assignment> = self
            .by_collection
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|assignment| assignment.agent_id == agent_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        entries
    }

    pub fn len(&self) -> usize {
        self.by_collection
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AssignmentLedger {
    fn default() -> Self {
        Self::new()
    }
}
