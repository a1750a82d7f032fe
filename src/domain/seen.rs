//! Bounded set of already dispatched operation ids.
//!
//! Poll windows can overlap at their boundaries, so the same operation may
//! come back twice. Entries are keyed by id and remember the operation
//! date so old ones can be dropped once they fall behind the watermark.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use super::payment::OperationId;

/// Seen-set with date-based retention.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    entries: HashMap<OperationId, i64>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatch. Returns false if the id was already recorded,
    /// in which case the first recorded date is kept.
    pub fn insert(&mut self, id: OperationId, operation_date: i64) -> bool {
        match self.entries.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(operation_date);
                true
            }
        }
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop every id whose operation date is strictly older than `cutoff`.
    ///
    /// Returns the number of evicted entries.
    pub fn prune(&mut self, cutoff: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, date| *date >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
