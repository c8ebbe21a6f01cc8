//! Append-only history of snapshots plus the selection state coupling the
//! renderer to it. Writes are serialized through the controller loop; the
//! renderer and the diff worker only read.

use std::collections::HashMap;
use std::sync::Arc;

use crate::snapshot::Snapshot;
use crate::snapshot::SnapshotId;

#[derive(Default)]
pub struct HistoryStore {
    /// Ordered by id ascending, which is also insertion order.
    records: Vec<Arc<Snapshot>>,
    by_id: HashMap<SnapshotId, usize>,
    selected_id: Option<SnapshotId>,
    latest_finished_id: Option<SnapshotId>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot. Ids must arrive strictly increasing; a stale id is
    /// rejected so `by_id` stays consistent with `records`.
    pub fn append(&mut self, snapshot: Arc<Snapshot>) -> bool {
        let id = snapshot.id();
        if self.records.last().is_some_and(|last| last.id() >= id) {
            return false;
        }

        self.by_id.insert(id, self.records.len());
        self.records.push(snapshot);
        true
    }

    pub fn by_index(&self, index: usize) -> Option<Arc<Snapshot>> {
        self.records.get(index).cloned()
    }

    pub fn index_of(&self, id: SnapshotId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, id: SnapshotId) -> Option<Arc<Snapshot>> {
        self.index_of(id).and_then(|index| self.by_index(index))
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn last(&self) -> Option<Arc<Snapshot>> {
        self.records.last().cloned()
    }

    pub fn selected_id(&self) -> Option<SnapshotId> {
        self.selected_id
    }

    pub fn set_selected_id(&mut self, id: SnapshotId) {
        self.selected_id = Some(id);
    }

    pub fn latest_finished_id(&self) -> Option<SnapshotId> {
        self.latest_finished_id
    }

    pub fn set_latest_finished_id(&mut self, id: SnapshotId) {
        self.latest_finished_id = Some(id);
    }

    /// Iterate records oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Snapshot>> {
        self.records.iter()
    }
}
