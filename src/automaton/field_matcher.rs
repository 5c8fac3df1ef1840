//! Field matchers: the nodes of the pattern graph.
//!
//! A field matcher maps field paths to value matchers and records which
//! patterns are satisfied on arrival. Updates are copy-on-write snapshots
//! published through `ArcSwap`, same as value matchers.

use std::hash::Hash;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use rustc_hash::FxHashMap;

use super::arena::StateStore;
use super::core_matcher::BuildState;
use super::nfa::NfaBuffers;
use super::value_matcher::{Transitions, ValueMatcher};
use crate::pattern::PatternField;

/// A pattern identifier recorded at a field matcher.
///
/// `guard` is set when the pattern also has `exists: false` fields; it names
/// the serial that an absent-field failure must not have reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchEntry<X> {
    pub x: X,
    pub guard: Option<u64>,
}

pub(crate) struct MatcherFields<X> {
    pub(crate) transitions: FxHashMap<Box<[u8]>, Arc<ValueMatcher<X>>>,
    pub(crate) matches: Vec<MatchEntry<X>>,
    pub(crate) exists_false_failures: Vec<u64>,
}

impl<X: Clone> Clone for MatcherFields<X> {
    fn clone(&self) -> Self {
        Self {
            transitions: self.transitions.clone(),
            matches: self.matches.clone(),
            exists_false_failures: self.exists_false_failures.clone(),
        }
    }
}

impl<X> Default for MatcherFields<X> {
    fn default() -> Self {
        Self {
            transitions: FxHashMap::default(),
            matches: Vec::new(),
            exists_false_failures: Vec::new(),
        }
    }
}

pub struct FieldMatcher<X> {
    fields: ArcSwap<MatcherFields<X>>,
}

impl<X> Default for FieldMatcher<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> FieldMatcher<X> {
    pub fn new() -> Self {
        Self {
            fields: ArcSwap::from_pointee(MatcherFields::default()),
        }
    }

    pub(crate) fn load(&self) -> Guard<Arc<MatcherFields<X>>> {
        self.fields.load()
    }

    /// Follow the value of one event field to the next field matchers.
    pub fn transition_on(
        &self,
        path: &[u8],
        val: &[u8],
        store: &StateStore<X>,
        bufs: &mut NfaBuffers,
    ) -> Transitions<X> {
        match self.fields.load().transitions.get(path) {
            Some(vm) => vm.transition_on(val, store, bufs),
            None => Transitions::new(),
        }
    }

    /// Paths this matcher has value matchers for.
    pub fn paths(&self) -> Vec<Vec<u8>> {
        self.fields
            .load()
            .transitions
            .keys()
            .map(|path| path.to_vec())
            .collect()
    }
}

impl<X: Clone + Eq + Hash> FieldMatcher<X> {
    /// Add every value of a pattern field, returning one next matcher per value.
    /// Must be called with the build lock held.
    pub fn add_transition(
        &self,
        field: &PatternField,
        build: &mut BuildState<X>,
    ) -> Vec<Arc<FieldMatcher<X>>> {
        let current = self.fields.load_full();
        let path = field.path.as_bytes();
        let vm = match current.transitions.get(path) {
            Some(vm) => Arc::clone(vm),
            None => {
                let vm = Arc::new(ValueMatcher::new());
                let mut fresh = (*current).clone();
                fresh.transitions.insert(path.into(), Arc::clone(&vm));
                self.fields.store(Arc::new(fresh));
                vm
            }
        };

        let mut next = Vec::with_capacity(field.vals.len());
        for val in &field.vals {
            let target = vm.add_transition(val, build);
            if !next.iter().any(|existing| Arc::ptr_eq(existing, &target)) {
                next.push(target);
            }
        }
        next
    }

    pub(crate) fn add_match(&self, entry: MatchEntry<X>) {
        let mut fresh = (*self.fields.load_full()).clone();
        if !fresh.matches.contains(&entry) {
            fresh.matches.push(entry);
            self.fields.store(Arc::new(fresh));
        }
    }

    pub(crate) fn add_exists_false_failure(&self, serial: u64) {
        let mut fresh = (*self.fields.load_full()).clone();
        fresh.exists_false_failures.push(serial);
        self.fields.store(Arc::new(fresh));
    }
}
