//! Automaton-based pattern matching engine
//!
//! Patterns compile into a graph of field matchers. Each edge out of a field
//! matcher is a value matcher: a byte automaton over one field's values,
//! whose accepting states name the next field matchers. The key components are:
//!
//! - `SmallTable`: A compact byte-indexed transition table
//! - `FaState`: A state in a value automaton
//! - `StateStore`: Append-only storage for every automaton state
//! - `ValueMatcher`: Matches field values using the automaton
//! - `FieldMatcher`: Matches field paths and dispatches to value matchers
//! - `CoreMatcher`: Adds patterns and matches events against all of them
//!
//! # Module Organization
//!
//! - `small_table`: Transition tables and automaton states
//! - `arena`: State ids and the concurrent state arena
//! - `interner`: Canonical NFA step lists
//! - `fa_builders`: FA construction and merging (make_*_fa, merge_*)
//! - `nfa`: NFA/DFA traversal functions
//! - `value_matcher` / `field_matcher` / `core_matcher`: The pattern graph

mod arena;
mod core_matcher;
mod fa_builders;
mod field_matcher;
mod interner;
mod nfa;
mod small_table;
mod value_matcher;

pub use arena::{ListId, StateArena, StateId, StateStore};
pub use core_matcher::{no_array_trail_conflict, BuildState, CoreMatcher};
pub use fa_builders::{
    dfa_to_nfa, make_anything_but_fa, make_monocase_fa, make_prefix_fa, make_shellstyle_fa,
    make_string_fa, merge_dfas, merge_nfas,
};
pub use field_matcher::{FieldMatcher, MatchEntry};
pub use interner::StepListInterner;
pub use nfa::{traverse_dfa, traverse_nfa, NfaBuffers};
pub use small_table::{DfaState, FaState, NfaState, SmallTable, BYTE_CEILING, VALUE_TERMINATOR};
pub use value_matcher::{Transitions, ValueMatcher};

#[cfg(test)]
mod tests;
