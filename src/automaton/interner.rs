//! Interning of NFA step lists.
//!
//! Two tables that step to the same set of states must hold the same `ListId`,
//! otherwise range packing would split runs that are really equal and the
//! NFA merge would treat identical targets as different.

use rustc_hash::FxHashMap;

use super::arena::{ListId, StateId, StateStore};

/// Canonical lists of NFA states, writer-side only.
#[derive(Debug, Default)]
pub struct StepListInterner {
    lists: FxHashMap<Box<[StateId]>, ListId>,
}

impl StepListInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for the set of states in `steps`, storing it if new.
    /// Order and duplicates in `steps` don't matter.
    pub fn intern<X>(&mut self, store: &StateStore<X>, mut steps: Vec<StateId>) -> ListId {
        steps.sort_unstable();
        steps.dedup();
        if let Some(&id) = self.lists.get(steps.as_slice()) {
            return id;
        }
        let list = steps.into_boxed_slice();
        let id = store.push_list(list.clone());
        self.lists.insert(list, id);
        id
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
