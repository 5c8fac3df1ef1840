//! NFA/DFA traversal functions.
//!
//! This module contains functions for traversing value automata:
//! - `traverse_dfa`: Deterministic traversal, one active state
//! - `traverse_nfa`: Non-deterministic traversal for shellstyle patterns
//!
//! Both feed the value's bytes followed by `VALUE_TERMINATOR` and report the
//! field transitions of every state entered along the way.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::arena::{StateId, StateStore};
use super::field_matcher::FieldMatcher;
use super::small_table::VALUE_TERMINATOR;

/// Reusable scratch space for NFA traversal, kept per matching call.
#[derive(Debug, Default)]
pub struct NfaBuffers {
    current: Vec<StateId>,
    next: Vec<StateId>,
    seen: FxHashSet<StateId>,
}

impl NfaBuffers {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Traverse a DFA on a value.
///
/// Appends the field matchers reached to `transitions`.
#[inline]
pub fn traverse_dfa<X>(
    store: &StateStore<X>,
    start: StateId,
    val: &[u8],
    transitions: &mut Vec<Arc<FieldMatcher<X>>>,
) {
    let mut state = store.dfa(start);
    transitions.extend(state.field_transitions.iter().cloned());

    for byte in val.iter().copied().chain(std::iter::once(VALUE_TERMINATOR)) {
        match state.table.step(byte) {
            Some(next) => {
                state = store.dfa(next);
                transitions.extend(state.field_transitions.iter().cloned());
            }
            None => break,
        }
    }
}

/// Traverse an NFA on a value.
///
/// All active states step together on each byte. A state reached from several
/// active states is kept once per byte, so glob loops don't multiply work.
pub fn traverse_nfa<X>(
    store: &StateStore<X>,
    start: StateId,
    val: &[u8],
    bufs: &mut NfaBuffers,
    transitions: &mut Vec<Arc<FieldMatcher<X>>>,
) {
    bufs.current.clear();
    bufs.current.push(start);
    transitions.extend(store.nfa(start).field_transitions.iter().cloned());

    for byte in val.iter().copied().chain(std::iter::once(VALUE_TERMINATOR)) {
        bufs.next.clear();
        bufs.seen.clear();
        for &id in &bufs.current {
            let Some(list) = store.nfa(id).table.step(byte) else {
                continue;
            };
            for &next in store.list(list) {
                if bufs.seen.insert(next) {
                    bufs.next.push(next);
                    transitions.extend(store.nfa(next).field_transitions.iter().cloned());
                }
            }
        }
        std::mem::swap(&mut bufs.current, &mut bufs.next);
        if bufs.current.is_empty() {
            break;
        }
    }
}
