//! Compact byte-indexed transition tables and the automaton states built on them.
//!
//! - `SmallTable`: maps every byte below `BYTE_CEILING` to a step, stored as runs
//! - `FaState`: one automaton state (a table plus the field matchers it reaches)
//! - `DfaState` / `NfaState`: the two step flavours used by value automata

use std::fmt;
use std::sync::Arc;

use super::arena::{ListId, StateId};
use super::field_matcher::FieldMatcher;

/// Maximum byte value we handle. UTF-8 bytes 0xF6-0xFF can't appear in valid strings.
pub const BYTE_CEILING: usize = 0xF6;

/// Marks the end of a value being matched. Exact matches step on it, prefix
/// matches never look for it, so both share one traversal.
pub const VALUE_TERMINATOR: u8 = 0xF5;

/// A compact lookup table encoding byte value ranges to steps.
///
/// The table uses a ceilings/steps representation where each ceiling marks the
/// upper bound (exclusive) of a byte range that maps to the corresponding step.
/// Adjacent bytes with the same step always share one range, and the last
/// ceiling is always `BYTE_CEILING`.
///
/// Example: To map bytes 3-4 to S1 and byte 0x34 to S2:
/// ```text
/// ceilings: [3, 5, 0x34, 0x35, BYTE_CEILING]
/// steps:    [None, Some(S1), None, Some(S2), None]
/// ```
///
/// Tables are never edited in place. `with_byte_step` and `with_range_steps`
/// unpack, update and re-pack into a new table, which the owner then publishes.
#[derive(Clone, PartialEq, Eq)]
pub struct SmallTable<S> {
    ceilings: Vec<u8>,
    steps: Vec<S>,
}

impl<S: Copy + PartialEq + Default> SmallTable<S> {
    /// Create a table where no byte has a step.
    pub fn new() -> Self {
        Self::with_default_step(S::default())
    }

    /// Create a table with the same step for every byte.
    pub fn with_default_step(step: S) -> Self {
        Self {
            ceilings: vec![BYTE_CEILING as u8],
            steps: vec![step],
        }
    }

    /// Create a table with a default step and specific byte-to-step mappings.
    pub fn with_mappings(default_step: S, indices: &[u8], specific_steps: &[S]) -> Self {
        let mut unpacked = vec![default_step; BYTE_CEILING];
        for (&index, &step) in indices.iter().zip(specific_steps) {
            if let Some(slot) = unpacked.get_mut(index as usize) {
                *slot = step;
            }
        }
        Self::pack(&unpacked)
    }

    /// Take a step on the given byte.
    #[inline]
    pub fn step(&self, utf8_byte: u8) -> S {
        for (i, &ceiling) in self.ceilings.iter().enumerate() {
            if utf8_byte < ceiling {
                return self.steps[i];
            }
        }
        // bytes at or above the ceiling can't occur in UTF-8
        S::default()
    }

    /// A copy of this table with `utf8_byte` mapped to `step`.
    pub fn with_byte_step(&self, utf8_byte: u8, step: S) -> Self {
        self.with_range_steps(utf8_byte, utf8_byte.saturating_add(1), step)
    }

    /// A copy of this table with every byte in `floor..ceiling` mapped to `step`.
    pub fn with_range_steps(&self, floor: u8, ceiling: u8, step: S) -> Self {
        let mut unpacked = self.unpack();
        let top = (ceiling as usize).min(BYTE_CEILING);
        let bottom = (floor as usize).min(top);
        for slot in &mut unpacked[bottom..top] {
            *slot = step;
        }
        Self::pack(&unpacked)
    }

    /// A table with the same ranges and every step passed through `f`.
    pub fn map_steps<T, F>(&self, mut f: F) -> SmallTable<T>
    where
        T: Copy + PartialEq + Default,
        F: FnMut(S) -> T,
    {
        let mut ceilings = Vec::with_capacity(self.ceilings.len());
        let mut steps: Vec<T> = Vec::with_capacity(self.steps.len());
        for (&ceiling, &step) in self.ceilings.iter().zip(&self.steps) {
            let mapped = f(step);
            match (ceilings.last_mut(), steps.last()) {
                (Some(last_ceiling), Some(last_step)) if *last_step == mapped => {
                    *last_ceiling = ceiling;
                }
                _ => {
                    ceilings.push(ceiling);
                    steps.push(mapped);
                }
            }
        }
        SmallTable { ceilings, steps }
    }

    /// Unpack the compact representation into one step per byte.
    pub fn unpack(&self) -> Vec<S> {
        let mut unpacked = Vec::with_capacity(BYTE_CEILING);
        for (&ceiling, &step) in self.ceilings.iter().zip(&self.steps) {
            unpacked.resize(ceiling as usize, step);
        }
        unpacked
    }

    /// Pack one-step-per-byte into compact form, coalescing equal neighbours.
    pub fn pack(unpacked: &[S]) -> Self {
        assert_eq!(
            unpacked.len(),
            BYTE_CEILING,
            "unpacked table must cover every byte below the ceiling"
        );
        let mut ceilings = Vec::with_capacity(8);
        let mut steps = Vec::with_capacity(8);

        let mut last_step = unpacked[0];
        for (i, &step) in unpacked.iter().enumerate() {
            if step != last_step {
                ceilings.push(i as u8);
                steps.push(last_step);
            }
            last_step = step;
        }
        ceilings.push(BYTE_CEILING as u8);
        steps.push(last_step);

        Self { ceilings, steps }
    }

    /// Number of byte ranges in the table.
    pub fn range_count(&self) -> usize {
        self.ceilings.len()
    }

    /// Iterate over `(floor, ceiling, step)` for every range.
    pub fn ranges(&self) -> impl Iterator<Item = (u8, u8, S)> + '_ {
        let floors = std::iter::once(0).chain(self.ceilings.iter().copied());
        floors
            .zip(self.ceilings.iter().copied())
            .zip(self.steps.iter().copied())
            .map(|((floor, ceiling), step)| (floor, ceiling, step))
    }
}

impl<S: Copy + PartialEq + Default> Default for SmallTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: fmt::Debug> fmt::Debug for SmallTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut floor = 0u8;
        for (&ceiling, step) in self.ceilings.iter().zip(&self.steps) {
            list.entry(&format_args!("{floor:#04x}..{ceiling:#04x} => {step:?}"));
            floor = ceiling;
        }
        list.finish()
    }
}

/// A state in a value automaton.
///
/// Field transitions are reported as soon as the state is entered, which is
/// how a prefix match fires before the value ends.
pub struct FaState<X, S> {
    pub table: SmallTable<S>,
    pub field_transitions: Vec<Arc<FieldMatcher<X>>>,
}

/// DFA state: each byte leads to at most one next state.
pub type DfaState<X> = FaState<X, Option<StateId>>;

/// NFA state: each byte leads to an interned list of next states.
pub type NfaState<X> = FaState<X, Option<ListId>>;

impl<X, S: Copy + PartialEq + Default> FaState<X, S> {
    pub fn with_table(table: SmallTable<S>) -> Self {
        Self {
            table,
            field_transitions: Vec::new(),
        }
    }

    pub fn with_transitions(
        table: SmallTable<S>,
        field_transitions: Vec<Arc<FieldMatcher<X>>>,
    ) -> Self {
        Self {
            table,
            field_transitions,
        }
    }
}

impl<X, S: fmt::Debug> fmt::Debug for FaState<X, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaState")
            .field("table", &self.table)
            .field("field_transitions", &self.field_transitions.len())
            .finish()
    }
}
