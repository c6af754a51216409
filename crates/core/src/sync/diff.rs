//! Resource diffing
//!
//! Compares two id-keyed views of one resource kind. Pure, no side effects.

use std::collections::BTreeMap;

use crate::resource::{Card, Preference, Resource, ResourceId, Task};
use crate::store::Snapshot;

/// Changes needed to turn one view of a resource kind into another
#[derive(Debug, Clone, PartialEq)]
pub struct Diff<R> {
    /// New versions of records present on both sides but not equal
    pub updated: Vec<R>,
    /// Ids present only on the old side
    pub removed: Vec<ResourceId>,
    /// Records present only on the new side
    pub added: Vec<R>,
}

impl<R> Default for Diff<R> {
    fn default() -> Self {
        Self {
            updated: Vec::new(),
            removed: Vec::new(),
            added: Vec::new(),
        }
    }
}

impl<R> Diff<R> {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty() && self.added.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updated.len() + self.removed.len() + self.added.len()
    }
}

/// Key records by id
pub fn index_by_id<R: Resource>(records: &[R]) -> BTreeMap<ResourceId, R> {
    records
        .iter()
        .map(|record| (record.id(), record.clone()))
        .collect()
}

/// Compute updated, removed and added records between `old` and `new`
pub fn diff<R: Resource>(old: &BTreeMap<ResourceId, R>, new: &BTreeMap<ResourceId, R>) -> Diff<R> {
    let mut result = Diff::default();

    for (id, old_record) in old {
        match new.get(id) {
            Some(new_record) if new_record != old_record => result.updated.push(new_record.clone()),
            Some(_) => {}
            None => result.removed.push(*id),
        }
    }

    for (id, new_record) in new {
        if !old.contains_key(id) {
            result.added.push(new_record.clone());
        }
    }

    result
}

/// Per-kind diffs between two snapshots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDiff {
    pub cards: Diff<Card>,
    pub tasks: Diff<Task>,
    pub preferences: Diff<Preference>,
}

impl SnapshotDiff {
    pub fn between(old: &Snapshot, new: &Snapshot) -> Self {
        Self {
            cards: diff(&index_by_id(&old.cards), &index_by_id(&new.cards)),
            tasks: diff(&index_by_id(&old.tasks), &index_by_id(&new.tasks)),
            preferences: diff(&index_by_id(&old.preferences), &index_by_id(&new.preferences)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty() && self.tasks.is_empty() && self.preferences.is_empty()
    }

    /// Total number of changed records across all kinds
    pub fn change_count(&self) -> usize {
        self.cards.len() + self.tasks.len() + self.preferences.len()
    }
}
