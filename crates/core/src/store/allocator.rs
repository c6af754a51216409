//! Per-kind id allocation

use std::collections::HashSet;

use crate::resource::ResourceId;

/// Tracks the live ids of one resource kind and hands out new ones.
///
/// Ids removed locally stay retired until the store is persisted, so an id
/// whose deletion has not reached the server yet is never handed out again.
#[derive(Debug, Default, Clone)]
pub(crate) struct IdAllocator {
    live: HashSet<ResourceId>,
    retired: HashSet<ResourceId>,
    last_allocated: Option<ResourceId>,
}

impl IdAllocator {
    /// Allocate the first free id above the last one handed out this session
    pub fn allocate(&mut self) -> ResourceId {
        let mut candidate = self
            .last_allocated
            .map(ResourceId::next)
            .unwrap_or(ResourceId::FIRST);
        while self.live.contains(&candidate) || self.retired.contains(&candidate) {
            candidate = candidate.next();
        }
        self.live.insert(candidate);
        self.last_allocated = Some(candidate);
        candidate
    }

    /// Register an existing id; false if it is already live
    pub fn insert(&mut self, id: ResourceId) -> bool {
        self.live.insert(id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.live.contains(&id)
    }

    pub fn release(&mut self, id: ResourceId) {
        if self.live.remove(&id) {
            self.retired.insert(id);
        }
    }

    /// Keep `id` out of circulation unless it is live
    pub fn reserve(&mut self, id: ResourceId) {
        if !self.live.contains(&id) {
            self.retired.insert(id);
        }
    }

    pub fn clear_retired(&mut self) {
        self.retired.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ResourceId {
        ResourceId::new(raw).unwrap()
    }

    #[test]
    fn test_allocate_skips_live_ids() {
        let mut ids = IdAllocator::default();
        ids.insert(id(1));
        ids.insert(id(3));

        assert_eq!(ids.allocate(), id(2));
        assert_eq!(ids.allocate(), id(4));
    }

    #[test]
    fn test_released_id_not_reused_until_cleared() {
        let mut ids = IdAllocator::default();
        let first = ids.allocate();
        ids.release(first);

        // fresh session scan starts over
        ids.last_allocated = None;
        assert_eq!(ids.allocate(), id(2));

        ids.clear_retired();
        ids.last_allocated = None;
        assert_eq!(ids.allocate(), first);
    }

    #[test]
    fn test_reserve_ignores_live_ids() {
        let mut ids = IdAllocator::default();
        ids.insert(id(1));
        ids.reserve(id(1));
        ids.reserve(id(2));

        assert!(ids.contains(id(1)));
        assert_eq!(ids.allocate(), id(3));
    }
}
