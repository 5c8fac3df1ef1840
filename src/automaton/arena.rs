//! Arena-based state allocation for value automata.
//!
//! States refer to each other by index, so glob automata can loop back to an
//! earlier state without ownership cycles. The arena is append-only: a slot is
//! written exactly once and never moves, so readers hold plain `&T` into it
//! without locking while the single writer keeps appending.
//!
//! Storage is split into buckets that double in size:
//! ```text
//! bucket 0: ids 0..32
//! bucket 1: ids 32..96
//! bucket 2: ids 96..224
//! ...
//! ```
//! Buckets are allocated on first use and never reallocated.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use super::small_table::{DfaState, NfaState};

/// A state identifier, an index into one of the state arenas.
///
/// This can be freely copied and allows cyclic references.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct StateId(u32);

impl StateId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of an interned, sorted list of NFA states.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ListId(u32);

impl ListId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

const FIRST_BUCKET_BITS: u32 = 5;
const BUCKET_COUNT: usize = 27;

/// Maps a slot index to its (bucket, offset) pair.
#[inline]
fn locate(index: u32) -> (usize, usize) {
    let biased = index as u64 + (1u64 << FIRST_BUCKET_BITS);
    let bit = 63 - biased.leading_zeros();
    let bucket = (bit - FIRST_BUCKET_BITS) as usize;
    let offset = (biased - (1u64 << bit)) as usize;
    (bucket, offset)
}

/// Append-only storage with lock-free reads.
///
/// Only one thread may append at a time (the owner serializes writers); any
/// number of threads may read published slots concurrently.
pub struct StateArena<T> {
    buckets: [OnceLock<Box<[OnceLock<T>]>>; BUCKET_COUNT],
    len: AtomicU32,
}

impl<T> StateArena<T> {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| OnceLock::new()),
            len: AtomicU32::new(0),
        }
    }

    /// Number of reserved slots, published or not.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve a slot to be filled later. Used when a state must know its own
    /// id before its table can be built.
    pub fn reserve(&self) -> u32 {
        let index = self.len.fetch_add(1, Ordering::AcqRel);
        let (bucket, _) = locate(index);
        assert!(bucket < BUCKET_COUNT, "state arena exhausted at {index}");
        self.buckets[bucket].get_or_init(|| {
            (0..1usize << (bucket as u32 + FIRST_BUCKET_BITS))
                .map(|_| OnceLock::new())
                .collect()
        });
        index
    }

    /// Publish the value of a reserved slot.
    ///
    /// # Panics
    /// If the slot was never reserved or was already filled.
    pub fn fill(&self, index: u32, value: T) {
        match self.slot(index) {
            Some(slot) if slot.set(value).is_ok() => {}
            _ => panic!("arena slot {index} filled twice or never reserved"),
        }
    }

    pub fn push(&self, value: T) -> u32 {
        let index = self.reserve();
        self.fill(index, value);
        index
    }

    /// # Panics
    /// If the slot has not been published. Every id handed to a reader comes
    /// from a published table, so this means the automaton is corrupt.
    #[inline]
    pub fn get(&self, index: u32) -> &T {
        match self.slot(index).and_then(OnceLock::get) {
            Some(value) => value,
            None => panic!("arena slot {index} read before it was published"),
        }
    }

    #[inline]
    fn slot(&self, index: u32) -> Option<&OnceLock<T>> {
        let (bucket, offset) = locate(index);
        self.buckets.get(bucket)?.get().map(|slots| &slots[offset])
    }
}

impl<T> Default for StateArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for StateArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateArena")
            .field("len", &self.len())
            .finish()
    }
}

/// Every automaton state and step list owned by one matcher.
///
/// DFA and NFA states live in separate arenas; a value matcher knows which
/// one its start state belongs to.
pub struct StateStore<X> {
    dfa: StateArena<DfaState<X>>,
    nfa: StateArena<NfaState<X>>,
    lists: StateArena<Box<[StateId]>>,
}

impl<X> StateStore<X> {
    pub fn new() -> Self {
        Self {
            dfa: StateArena::new(),
            nfa: StateArena::new(),
            lists: StateArena::new(),
        }
    }

    #[inline]
    pub fn dfa(&self, id: StateId) -> &DfaState<X> {
        self.dfa.get(id.0)
    }

    #[inline]
    pub fn nfa(&self, id: StateId) -> &NfaState<X> {
        self.nfa.get(id.0)
    }

    #[inline]
    pub fn list(&self, id: ListId) -> &[StateId] {
        self.lists.get(id.0)
    }

    pub fn push_dfa(&self, state: DfaState<X>) -> StateId {
        StateId(self.dfa.push(state))
    }

    pub fn reserve_dfa(&self) -> StateId {
        StateId(self.dfa.reserve())
    }

    pub fn fill_dfa(&self, id: StateId, state: DfaState<X>) {
        self.dfa.fill(id.0, state);
    }

    pub fn push_nfa(&self, state: NfaState<X>) -> StateId {
        StateId(self.nfa.push(state))
    }

    pub fn reserve_nfa(&self) -> StateId {
        StateId(self.nfa.reserve())
    }

    pub fn fill_nfa(&self, id: StateId, state: NfaState<X>) {
        self.nfa.fill(id.0, state);
    }

    /// Store a step list. Callers go through the interner so equal lists
    /// share one id.
    pub(crate) fn push_list(&self, list: Box<[StateId]>) -> ListId {
        ListId(self.lists.push(list))
    }

    /// `(dfa states, nfa states, step lists)` allocated so far.
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.dfa.len(), self.nfa.len(), self.lists.len())
    }
}

impl<X> Default for StateStore<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> fmt::Debug for StateStore<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (dfa, nfa, lists) = self.sizes();
        f.debug_struct("StateStore")
            .field("dfa", &dfa)
            .field("nfa", &nfa)
            .field("lists", &lists)
            .finish()
    }
}
