//! FA (Finite Automaton) construction and merging.
//!
//! This module contains functions for building the automata for each kind of
//! pattern value, plus the unions that fold them into one value automaton:
//! - `make_string_fa`: Exact matching
//! - `make_prefix_fa`: Prefix matching
//! - `make_monocase_fa`: Case-insensitive matching
//! - `make_anything_but_fa`: Negative matching
//! - `make_shellstyle_fa`: Single `*` wildcard patterns (NFA)
//! - `merge_dfas` / `merge_nfas`: Union of two automata
//! - `dfa_to_nfa`: Lift a DFA so it can be merged into an NFA
//!
//! Every builder allocates its states in the shared `StateStore` and returns
//! the id of the start state. All states are published before the id is
//! returned, so nothing built here is visible to readers half-done.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::arena::{ListId, StateId, StateStore};
use super::field_matcher::FieldMatcher;
use super::interner::StepListInterner;
use super::small_table::{FaState, SmallTable, BYTE_CEILING, VALUE_TERMINATOR};

/// Build a string-matching FA from a byte sequence.
///
/// Creates a chain of states where each byte transitions to the next,
/// with a final transition on VALUE_TERMINATOR to a match state.
pub fn make_string_fa<X>(
    store: &StateStore<X>,
    val: &[u8],
    next_field: Arc<FieldMatcher<X>>,
) -> StateId {
    let last = store.push_dfa(FaState::with_transitions(SmallTable::new(), vec![next_field]));
    let end = store.push_dfa(FaState::with_table(SmallTable::with_mappings(
        None,
        &[VALUE_TERMINATOR],
        &[Some(last)],
    )));
    byte_chain(store, val, end)
}

/// Build a prefix-matching FA.
///
/// The state reached after the last prefix byte carries the field
/// transition, so the match fires whatever follows.
pub fn make_prefix_fa<X>(
    store: &StateStore<X>,
    prefix: &[u8],
    next_field: Arc<FieldMatcher<X>>,
) -> StateId {
    let matched = store.push_dfa(FaState::with_transitions(SmallTable::new(), vec![next_field]));
    byte_chain(store, prefix, matched)
}

/// Chain of single-byte DFA states consuming `bytes` and landing on `end`.
fn byte_chain<X>(store: &StateStore<X>, bytes: &[u8], end: StateId) -> StateId {
    let mut current = end;
    for &byte in bytes.iter().rev() {
        current = store.push_dfa(FaState::with_table(SmallTable::with_mappings(
            None,
            &[byte],
            &[Some(current)],
        )));
    }
    current
}

/// Build an equals-ignore-case (monocase) FA.
///
/// For each character, every simple case variant gets its own byte path and
/// all of them land on the same next state. UTF-8 is prefix-free, so the
/// variants' encodings form a small trie with no ambiguous endings.
pub fn make_monocase_fa<X>(
    store: &StateStore<X>,
    val: &[u8],
    next_field: Arc<FieldMatcher<X>>,
) -> StateId {
    let Ok(text) = std::str::from_utf8(val) else {
        return make_string_fa(store, val, next_field);
    };

    let last = store.push_dfa(FaState::with_transitions(SmallTable::new(), vec![next_field]));
    let mut current = store.push_dfa(FaState::with_table(SmallTable::with_mappings(
        None,
        &[VALUE_TERMINATOR],
        &[Some(last)],
    )));
    for ch in text.chars().rev() {
        let encodings: Vec<Vec<u8>> = case_variants(ch)
            .into_iter()
            .map(|variant| {
                let mut buf = [0u8; 4];
                variant.encode_utf8(&mut buf).as_bytes().to_vec()
            })
            .collect();
        current = store.push_dfa(FaState::with_table(case_branch(store, &encodings, 0, current)));
    }
    current
}

/// The character plus its single-character lower and upper case forms.
fn case_variants(ch: char) -> Vec<char> {
    let mut variants = vec![ch];
    for other in [single_char(ch.to_lowercase()), single_char(ch.to_uppercase())]
        .into_iter()
        .flatten()
    {
        if !variants.contains(&other) {
            variants.push(other);
        }
    }
    variants
}

/// Multi-character mappings (e.g. 'ß' -> "SS") change the length, skip them.
fn single_char(mut chars: impl Iterator<Item = char>) -> Option<char> {
    let first = chars.next()?;
    match chars.next() {
        Some(_) => None,
        None => Some(first),
    }
}

fn case_branch<X>(
    store: &StateStore<X>,
    encodings: &[Vec<u8>],
    depth: usize,
    target: StateId,
) -> SmallTable<Option<StateId>> {
    let mut bytes: Vec<u8> = encodings.iter().filter_map(|e| e.get(depth).copied()).collect();
    bytes.sort_unstable();
    bytes.dedup();

    let mut steps = Vec::with_capacity(bytes.len());
    for &byte in &bytes {
        let continuing: Vec<Vec<u8>> = encodings
            .iter()
            .filter(|e| e.get(depth) == Some(&byte) && e.len() > depth + 1)
            .cloned()
            .collect();
        let step = if continuing.is_empty() {
            target
        } else {
            let table = case_branch(store, &continuing, depth + 1, target);
            store.push_dfa(FaState::with_table(table))
        };
        steps.push(Some(step));
    }
    SmallTable::with_mappings(None, &bytes, &steps)
}

/// Build an anything-but FA that matches any value NOT in the excluded list.
///
/// Every byte defaults to a success state. Bytes that follow one of the
/// excluded values lead to states that keep tracking it, and reaching the
/// terminator at the end of an excluded value leads nowhere.
pub fn make_anything_but_fa<X>(
    store: &StateStore<X>,
    excluded: &[Vec<u8>],
    next_field: Arc<FieldMatcher<X>>,
) -> StateId {
    let success = store.push_dfa(FaState::with_transitions(SmallTable::new(), vec![next_field]));
    let start = store.reserve_dfa();

    // (state, values still being tracked, byte index, an excluded value ends here)
    let mut pending: Vec<(StateId, Vec<&[u8]>, usize, bool)> =
        vec![(start, excluded.iter().map(Vec::as_slice).collect(), 0, false)];
    while let Some((state, vals, index, ends_here)) = pending.pop() {
        let mut unpacked = vec![Some(success); BYTE_CEILING];

        let mut bytes: Vec<u8> = vals.iter().filter_map(|v| v.get(index).copied()).collect();
        bytes.sort_unstable();
        bytes.dedup();

        for utf8_byte in bytes {
            let with_byte = vals.iter().filter(|v| v.get(index) == Some(&utf8_byte));
            let child_ends = with_byte.clone().any(|v| v.len() == index + 1);
            let continuing: Vec<&[u8]> =
                with_byte.filter(|v| v.len() > index + 1).copied().collect();

            let child = if continuing.is_empty() {
                let table = SmallTable::with_default_step(Some(success))
                    .with_byte_step(VALUE_TERMINATOR, None);
                store.push_dfa(FaState::with_table(table))
            } else {
                let child = store.reserve_dfa();
                pending.push((child, continuing, index + 1, child_ends));
                child
            };
            unpacked[utf8_byte as usize] = Some(child);
        }

        let mut table = SmallTable::pack(&unpacked);
        if ends_here {
            table = table.with_byte_step(VALUE_TERMINATOR, None);
        }
        store.fill_dfa(state, FaState::with_table(table));
    }
    start
}

/// Build a shellstyle pattern NFA.
///
/// `*` matches zero or more bytes. The value may hold at most one `*`; the
/// pattern parser rejects more. The automaton looks like this, where `G` is
/// the glob state and `e1..en` track the suffix after the `*`:
/// ```text
/// prefix -> G --s[0]--> {e1, G} --s[1]--> e2 ... en --TERMINATOR--> match
///           ^ any byte  |
///           +-----------+   (every e_i loops back to G on a mismatch)
/// ```
/// When the `*` is the last character of the string, G just moves to the
/// match state on any byte.
pub fn make_shellstyle_fa<X>(
    store: &StateStore<X>,
    interner: &mut StepListInterner,
    val: &[u8],
    next_field: Arc<FieldMatcher<X>>,
) -> StateId {
    let matched = store.push_nfa(FaState::with_transitions(SmallTable::new(), vec![next_field]));
    let matched_list = interner.intern(store, vec![matched]);

    let Some(star) = val.iter().position(|&b| b == b'*') else {
        let end = store.push_nfa(FaState::with_table(SmallTable::with_mappings(
            None,
            &[VALUE_TERMINATOR],
            &[Some(matched_list)],
        )));
        return nfa_chain(store, interner, val, end);
    };
    let (prefix, suffix) = (&val[..star], &val[star + 1..]);

    // a trailing `*` only has the closing quote behind it
    if suffix.len() <= 1 {
        let glob = store.push_nfa(FaState::with_table(SmallTable::with_default_step(Some(
            matched_list,
        ))));
        return nfa_chain(store, interner, prefix, glob);
    }

    let glob = store.reserve_nfa();
    let glob_list = interner.intern(store, vec![glob]);
    let loop_back = SmallTable::new().with_range_steps(0, VALUE_TERMINATOR, Some(glob_list));

    let mut exit = store.push_nfa(FaState::with_table(
        loop_back.with_byte_step(VALUE_TERMINATOR, Some(matched_list)),
    ));
    for &byte in suffix[1..].iter().rev() {
        let next = interner.intern(store, vec![exit]);
        exit = store.push_nfa(FaState::with_table(loop_back.with_byte_step(byte, Some(next))));
    }

    let escape = interner.intern(store, vec![exit, glob]);
    store.fill_nfa(glob, FaState::with_table(loop_back.with_byte_step(suffix[0], Some(escape))));

    nfa_chain(store, interner, prefix, glob)
}

fn nfa_chain<X>(
    store: &StateStore<X>,
    interner: &mut StepListInterner,
    bytes: &[u8],
    end: StateId,
) -> StateId {
    let mut current = end;
    for &byte in bytes.iter().rev() {
        let next = interner.intern(store, vec![current]);
        current = store.push_nfa(FaState::with_table(SmallTable::with_mappings(
            None,
            &[byte],
            &[Some(next)],
        )));
    }
    current
}

/// Concatenate two field transition lists, dropping pointer duplicates.
fn union_transitions<X>(
    first: &[Arc<FieldMatcher<X>>],
    second: &[Arc<FieldMatcher<X>>],
) -> Vec<Arc<FieldMatcher<X>>> {
    let mut merged = first.to_vec();
    for fm in second {
        if !merged.iter().any(|existing| Arc::ptr_eq(existing, fm)) {
            merged.push(Arc::clone(fm));
        }
    }
    merged
}

/// Merge two DFAs into one that matches whatever either matches.
///
/// Where only one side has a step, the merged table reuses it unchanged.
/// Where both do, the two targets are merged as a pair. Results are
/// memoized per pair, so shared structure is merged once.
pub fn merge_dfas<X>(store: &StateStore<X>, first: StateId, second: StateId) -> StateId {
    let mut merger = DfaMerger {
        store,
        memo: FxHashMap::default(),
        pending: Vec::new(),
    };
    let merged = merger.pair(first, second);
    merger.drain();
    merged
}

/// Pairs are given an id when first seen and built later from `pending`,
/// so long values don't deepen the call stack.
struct DfaMerger<'a, X> {
    store: &'a StateStore<X>,
    memo: FxHashMap<(StateId, StateId), StateId>,
    pending: Vec<(StateId, StateId, StateId)>,
}

impl<X> DfaMerger<'_, X> {
    fn pair(&mut self, first: StateId, second: StateId) -> StateId {
        if first == second {
            return first;
        }
        if let Some(&merged) = self.memo.get(&(first, second)) {
            return merged;
        }
        let merged = self.store.reserve_dfa();
        self.memo.insert((first, second), merged);
        self.pending.push((first, second, merged));
        merged
    }

    fn drain(&mut self) {
        let store = self.store;
        while let Some((first, second, merged)) = self.pending.pop() {
            let state1 = store.dfa(first);
            let state2 = store.dfa(second);
            let unpacked1 = state1.table.unpack();
            let unpacked2 = state2.table.unpack();

            let mut combined = Vec::with_capacity(BYTE_CEILING);
            for (step1, step2) in unpacked1.into_iter().zip(unpacked2) {
                combined.push(match (step1, step2) {
                    (Some(s1), Some(s2)) => Some(self.pair(s1, s2)),
                    (step, None) | (None, step) => step,
                });
            }

            let field_transitions =
                union_transitions(&state1.field_transitions, &state2.field_transitions);
            store.fill_dfa(
                merged,
                FaState::with_transitions(SmallTable::pack(&combined), field_transitions),
            );
        }
    }
}

/// Merge two NFAs into one that matches whatever either matches.
///
/// Step lists are merged by union. When both sides step to a single state
/// the two states are merged instead, which keeps the merged automaton
/// close to deterministic along shared literal prefixes.
pub fn merge_nfas<X>(
    store: &StateStore<X>,
    interner: &mut StepListInterner,
    first: StateId,
    second: StateId,
) -> StateId {
    let mut merger = NfaMerger {
        store,
        interner,
        states: FxHashMap::default(),
        lists: FxHashMap::default(),
        pending: Vec::new(),
    };
    let merged = merger.pair(first, second);
    merger.drain();
    merged
}

struct NfaMerger<'a, X> {
    store: &'a StateStore<X>,
    interner: &'a mut StepListInterner,
    states: FxHashMap<(StateId, StateId), StateId>,
    lists: FxHashMap<(ListId, ListId), ListId>,
    pending: Vec<(StateId, StateId, StateId)>,
}

impl<X> NfaMerger<'_, X> {
    fn pair(&mut self, first: StateId, second: StateId) -> StateId {
        if first == second {
            return first;
        }
        let key = (first.min(second), first.max(second));
        if let Some(&merged) = self.states.get(&key) {
            return merged;
        }
        let merged = self.store.reserve_nfa();
        self.states.insert(key, merged);
        self.pending.push((first, second, merged));
        merged
    }

    fn drain(&mut self) {
        let store = self.store;
        while let Some((first, second, merged)) = self.pending.pop() {
            let state1 = store.nfa(first);
            let state2 = store.nfa(second);
            let unpacked1 = state1.table.unpack();
            let unpacked2 = state2.table.unpack();

            let mut combined = Vec::with_capacity(BYTE_CEILING);
            for (list1, list2) in unpacked1.into_iter().zip(unpacked2) {
                combined.push(self.merge_lists(list1, list2));
            }

            let field_transitions =
                union_transitions(&state1.field_transitions, &state2.field_transitions);
            store.fill_nfa(
                merged,
                FaState::with_transitions(SmallTable::pack(&combined), field_transitions),
            );
        }
    }

    fn merge_lists(&mut self, first: Option<ListId>, second: Option<ListId>) -> Option<ListId> {
        let (l1, l2) = match (first, second) {
            (Some(l1), Some(l2)) if l1 != l2 => (l1, l2),
            (None, list) => return list,
            (list, _) => return list,
        };
        let key = (l1.min(l2), l1.max(l2));
        if let Some(&merged) = self.lists.get(&key) {
            return Some(merged);
        }

        let store = self.store;
        let merged = match (store.list(l1), store.list(l2)) {
            (&[s1], &[s2]) => {
                let state = self.pair(s1, s2);
                self.interner.intern(store, vec![state])
            }
            (states1, states2) => {
                let union = states1.iter().chain(states2).copied().collect();
                self.interner.intern(store, union)
            }
        };
        self.lists.insert(key, merged);
        Some(merged)
    }
}

/// Convert a DFA into an equivalent NFA whose steps are singleton lists.
pub fn dfa_to_nfa<X>(
    store: &StateStore<X>,
    interner: &mut StepListInterner,
    start: StateId,
) -> StateId {
    let mut converter = DfaConverter {
        store,
        interner,
        memo: FxHashMap::default(),
        pending: Vec::new(),
    };
    let nfa = converter.lift(start);
    converter.drain();
    nfa
}

struct DfaConverter<'a, X> {
    store: &'a StateStore<X>,
    interner: &'a mut StepListInterner,
    memo: FxHashMap<StateId, StateId>,
    pending: Vec<(StateId, StateId)>,
}

impl<X> DfaConverter<'_, X> {
    fn lift(&mut self, dfa: StateId) -> StateId {
        if let Some(&nfa) = self.memo.get(&dfa) {
            return nfa;
        }
        let nfa = self.store.reserve_nfa();
        self.memo.insert(dfa, nfa);
        self.pending.push((dfa, nfa));
        nfa
    }

    fn drain(&mut self) {
        let store = self.store;
        while let Some((dfa, nfa)) = self.pending.pop() {
            let state = store.dfa(dfa);
            let table = state.table.map_steps(|step| {
                step.map(|next| {
                    let lifted = self.lift(next);
                    self.interner.intern(store, vec![lifted])
                })
            });
            store.fill_nfa(
                nfa,
                FaState::with_transitions(table, state.field_transitions.clone()),
            );
        }
    }
}
