//! Per-field value automaton with lock-free reads.
//!
//! A value matcher starts empty, holds a single literal inline while that's
//! all it has, becomes a DFA when a second value arrives and becomes an NFA
//! when a shellstyle value arrives. Each change builds a complete new
//! snapshot and publishes it with one store, so a reader sees either the old
//! matcher or the new one.

use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;
use smallvec::SmallVec;
use tracing::trace;

use super::arena::{StateId, StateStore};
use super::core_matcher::BuildState;
use super::fa_builders::{
    dfa_to_nfa, make_anything_but_fa, make_monocase_fa, make_prefix_fa, make_shellstyle_fa,
    make_string_fa, merge_dfas, merge_nfas,
};
use super::field_matcher::FieldMatcher;
use super::nfa::{traverse_dfa, traverse_nfa, NfaBuffers};
use crate::numbers;
use crate::pattern::TypedValue;

/// Field matchers a single value transitions to. Usually one or two.
pub type Transitions<X> = SmallVec<[Arc<FieldMatcher<X>>; 4]>;

struct ValueFields<X> {
    singleton_match: Option<Box<[u8]>>,
    singleton_transition: Option<Arc<FieldMatcher<X>>>,
    start: Option<StateId>,
    is_nondeterministic: bool,
    has_numbers: bool,
    exists_transitions: Vec<Arc<FieldMatcher<X>>>,
}

impl<X> Clone for ValueFields<X> {
    fn clone(&self) -> Self {
        Self {
            singleton_match: self.singleton_match.clone(),
            singleton_transition: self.singleton_transition.clone(),
            start: self.start,
            is_nondeterministic: self.is_nondeterministic,
            has_numbers: self.has_numbers,
            exists_transitions: self.exists_transitions.clone(),
        }
    }
}

impl<X> Default for ValueFields<X> {
    fn default() -> Self {
        Self {
            singleton_match: None,
            singleton_transition: None,
            start: None,
            is_nondeterministic: false,
            has_numbers: false,
            exists_transitions: Vec::new(),
        }
    }
}

impl<X> ValueFields<X> {
    fn is_empty(&self) -> bool {
        self.singleton_match.is_none() && self.start.is_none()
    }
}

/// Matches the values of one field path.
pub struct ValueMatcher<X> {
    fields: ArcSwap<ValueFields<X>>,
}

impl<X> Default for ValueMatcher<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> ValueMatcher<X> {
    pub fn new() -> Self {
        Self {
            fields: ArcSwap::from_pointee(ValueFields::default()),
        }
    }

    /// Whether values are matched with an NFA.
    pub fn is_nondeterministic(&self) -> bool {
        self.fields.load().is_nondeterministic
    }

    /// Whether only an inline singleton literal is held.
    pub fn is_singleton(&self) -> bool {
        self.fields.load().singleton_match.is_some()
    }

    /// Find the field matchers a value leads to.
    ///
    /// `exists` transitions are always included. The singleton literal is
    /// checked before the automaton.
    pub fn transition_on(
        &self,
        val: &[u8],
        store: &StateStore<X>,
        bufs: &mut NfaBuffers,
    ) -> Transitions<X> {
        let fields = self.fields.load();
        let mut out: Transitions<X> = fields.exists_transitions.iter().cloned().collect();

        if let (Some(singleton), Some(target)) =
            (&fields.singleton_match, &fields.singleton_transition)
        {
            if **singleton == *val {
                out.push(Arc::clone(target));
            }
            return out;
        }

        let Some(start) = fields.start else {
            return out;
        };
        let mut reached = Vec::new();
        self.traverse(&fields, store, start, val, bufs, &mut reached);
        if fields.has_numbers && numbers::looks_numeric(val) {
            if let Some(canonical) = numbers::canonical_or_none(val) {
                self.traverse(&fields, store, start, &canonical, bufs, &mut reached);
            }
        }

        for fm in reached {
            if !out.iter().any(|existing| Arc::ptr_eq(existing, &fm)) {
                out.push(fm);
            }
        }
        out
    }

    fn traverse(
        &self,
        fields: &ValueFields<X>,
        store: &StateStore<X>,
        start: StateId,
        val: &[u8],
        bufs: &mut NfaBuffers,
        reached: &mut Vec<Arc<FieldMatcher<X>>>,
    ) {
        if fields.is_nondeterministic {
            traverse_nfa(store, start, val, bufs, reached);
        } else {
            traverse_dfa(store, start, val, reached);
        }
    }
}

impl<X: Clone + Eq + Hash> ValueMatcher<X> {
    /// Add one pattern value and return the field matcher it leads to.
    ///
    /// Adding the same literal twice returns the same field matcher, so
    /// patterns that share a value share the rest of their path too.
    /// Must be called with the build lock held.
    pub fn add_transition(
        &self,
        val: &TypedValue,
        build: &mut BuildState<X>,
    ) -> Arc<FieldMatcher<X>> {
        let current = self.fields.load_full();
        let mut fresh = (*current).clone();
        let owner = self as *const Self as usize;

        let target = match val {
            TypedValue::Exists(_) => {
                let next = Arc::new(FieldMatcher::new());
                fresh.exists_transitions.push(Arc::clone(&next));
                next
            }
            TypedValue::String(bytes) | TypedValue::Literal(bytes) => {
                if let Some(existing) = build.exact_target(owner, bytes) {
                    return existing;
                }
                let next = Arc::new(FieldMatcher::new());
                if fresh.is_empty() {
                    fresh.singleton_match = Some(bytes.clone().into_boxed_slice());
                    fresh.singleton_transition = Some(Arc::clone(&next));
                } else {
                    let fa = make_string_fa(&build.store, bytes, Arc::clone(&next));
                    self.install_dfa(&mut fresh, build, fa);
                }
                build.remember_exact(owner, bytes, Arc::clone(&next));
                next
            }
            TypedValue::Number { text, canonical } => {
                if let Some(existing) = build.exact_target(owner, canonical) {
                    return existing;
                }
                let next = Arc::new(FieldMatcher::new());
                let store = &build.store;
                let literal = make_string_fa(store, text, Arc::clone(&next));
                let numeric = make_string_fa(store, canonical, Arc::clone(&next));
                let fa = merge_dfas(store, literal, numeric);
                fresh.has_numbers = true;
                self.install_dfa(&mut fresh, build, fa);
                build.remember_exact(owner, canonical, Arc::clone(&next));
                next
            }
            TypedValue::Prefix(bytes) => {
                let next = Arc::new(FieldMatcher::new());
                let fa = make_prefix_fa(&build.store, bytes, Arc::clone(&next));
                self.install_dfa(&mut fresh, build, fa);
                next
            }
            TypedValue::EqualsIgnoreCase(bytes) => {
                let next = Arc::new(FieldMatcher::new());
                let fa = make_monocase_fa(&build.store, bytes, Arc::clone(&next));
                self.install_dfa(&mut fresh, build, fa);
                next
            }
            TypedValue::AnythingBut(excluded) => {
                let next = Arc::new(FieldMatcher::new());
                let fa = make_anything_but_fa(&build.store, excluded, Arc::clone(&next));
                self.install_dfa(&mut fresh, build, fa);
                next
            }
            TypedValue::Shellstyle(bytes) => {
                let next = Arc::new(FieldMatcher::new());
                let fa = make_shellstyle_fa(
                    &build.store,
                    &mut build.interner,
                    bytes,
                    Arc::clone(&next),
                );
                self.install_nfa(&mut fresh, build, fa);
                next
            }
        };

        self.fields.store(Arc::new(fresh));
        target
    }

    /// Turn an inline singleton into a DFA so another automaton can merge in.
    fn absorb_singleton(&self, fresh: &mut ValueFields<X>, build: &mut BuildState<X>) {
        if let (Some(val), Some(target)) =
            (fresh.singleton_match.take(), fresh.singleton_transition.take())
        {
            trace!(len = val.len(), "value matcher leaving singleton form");
            fresh.start = Some(make_string_fa(&build.store, &val, target));
            fresh.is_nondeterministic = false;
        }
    }

    fn install_dfa(&self, fresh: &mut ValueFields<X>, build: &mut BuildState<X>, fa: StateId) {
        self.absorb_singleton(fresh, build);
        let (store, interner) = (&build.store, &mut build.interner);
        fresh.start = Some(match fresh.start {
            None => fa,
            Some(start) if fresh.is_nondeterministic => {
                let lifted = dfa_to_nfa(store, interner, fa);
                merge_nfas(store, interner, start, lifted)
            }
            Some(start) => merge_dfas(store, start, fa),
        });
    }

    fn install_nfa(&self, fresh: &mut ValueFields<X>, build: &mut BuildState<X>, fa: StateId) {
        self.absorb_singleton(fresh, build);
        let (store, interner) = (&build.store, &mut build.interner);
        fresh.start = Some(match fresh.start {
            None => fa,
            Some(start) if fresh.is_nondeterministic => merge_nfas(store, interner, start, fa),
            Some(start) => {
                trace!("value matcher switching to nondeterministic form");
                let lifted = dfa_to_nfa(store, interner, start);
                merge_nfas(store, interner, lifted, fa)
            }
        });
        fresh.is_nondeterministic = true;
    }
}
