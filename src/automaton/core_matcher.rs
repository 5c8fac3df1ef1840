//! The compiled pattern graph and the search that runs events through it.
//!
//! `CoreMatcher` is safe to share between threads. Matching never locks:
//! every structure a matcher reads is either an `ArcSwap` snapshot or an
//! arena slot that was published before anything pointed at it. Adding a
//! pattern takes the build lock, so there is one writer at a time.

use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::arena::StateStore;
use super::field_matcher::{FieldMatcher, MatchEntry};
use super::interner::StepListInterner;
use super::nfa::NfaBuffers;
use crate::flattener::{ArrayPos, Field, Flattener, JsonFlattener, NameTracker};
use crate::pattern::{parse_pattern, validate_field, PatternField, SEGMENT_SEPARATOR};
use crate::QuaminaError;

/// Writer-only state, guarded by the build lock.
pub struct BuildState<X> {
    pub(crate) store: Arc<StateStore<X>>,
    pub(crate) interner: StepListInterner,
    /// Targets of exact values, keyed by (value matcher address, value bytes).
    exact_targets: FxHashMap<(usize, Box<[u8]>), Arc<FieldMatcher<X>>>,
    next_serial: u64,
    pattern_count: usize,
}

impl<X> BuildState<X> {
    pub(crate) fn new(store: Arc<StateStore<X>>) -> Self {
        Self {
            store,
            interner: StepListInterner::new(),
            exact_targets: FxHashMap::default(),
            next_serial: 0,
            pattern_count: 0,
        }
    }

    pub(crate) fn exact_target(&self, owner: usize, val: &[u8]) -> Option<Arc<FieldMatcher<X>>> {
        self.exact_targets
            .get(&(owner, Box::from(val)))
            .map(Arc::clone)
    }

    pub(crate) fn remember_exact(&mut self, owner: usize, val: &[u8], target: Arc<FieldMatcher<X>>) {
        self.exact_targets.insert((owner, Box::from(val)), target);
    }
}

/// Matches flattened events against every added pattern at once.
pub struct CoreMatcher<X> {
    root: Arc<FieldMatcher<X>>,
    store: Arc<StateStore<X>>,
    /// Patterns made only of `exists: false` clauses. They match unless a
    /// failure for their serial is observed.
    presumed: ArcSwap<Vec<MatchEntry<X>>>,
    names_used: ArcSwap<FxHashSet<String>>,
    build_lock: Mutex<BuildState<X>>,
}

impl<X: Clone + Eq + Hash> Default for CoreMatcher<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: Clone + Eq + Hash> CoreMatcher<X> {
    pub fn new() -> Self {
        let store = Arc::new(StateStore::new());
        Self {
            root: Arc::new(FieldMatcher::new()),
            store: Arc::clone(&store),
            presumed: ArcSwap::from_pointee(Vec::new()),
            names_used: ArcSwap::from_pointee(FxHashSet::default()),
            build_lock: Mutex::new(BuildState::new(store)),
        }
    }

    /// Parse a pattern and add it under the identifier `x`.
    ///
    /// Nothing is changed if the pattern is rejected.
    pub fn add_pattern(&self, x: X, pattern: &str) -> Result<(), QuaminaError> {
        let (fields, names) = parse_pattern(pattern)?;
        self.install(x, fields, names);
        Ok(())
    }

    /// Add an already-parsed pattern.
    pub fn add_pattern_fields(&self, x: X, fields: Vec<PatternField>) -> Result<(), QuaminaError> {
        if fields.is_empty() {
            return Err(QuaminaError::InvalidPattern(
                "pattern must have at least one field".into(),
            ));
        }
        for field in &fields {
            validate_field(field)?;
        }
        let names = fields
            .iter()
            .flat_map(|field| field.path.split(SEGMENT_SEPARATOR))
            .map(str::to_owned)
            .collect();
        self.install(x, fields, names);
        Ok(())
    }

    fn install(&self, x: X, mut fields: Vec<PatternField>, names: Vec<String>) {
        fields.sort_by(|a, b| a.path.cmp(&b.path));

        let mut build = self.build_lock.lock();

        // names go out first so the flattener keeps fields a new match needs
        let mut used = (**self.names_used.load()).clone();
        used.extend(names);
        self.names_used.store(Arc::new(used));

        let guard = if fields.iter().any(PatternField::is_exists_false) {
            let serial = build.next_serial;
            build.next_serial += 1;
            Some(serial)
        } else {
            None
        };

        let mut frontier = vec![Arc::clone(&self.root)];
        for field in &fields {
            let mut next_frontier: Vec<Arc<FieldMatcher<X>>> = Vec::with_capacity(frontier.len());
            for state in &frontier {
                let reached = state.add_transition(field, &mut build);
                if field.is_exists_false() {
                    // the absent field leaves the frontier where it was
                    for failure in reached {
                        if let Some(serial) = guard {
                            failure.add_exists_false_failure(serial);
                        }
                    }
                    push_unique(&mut next_frontier, Arc::clone(state));
                } else {
                    for next in reached {
                        push_unique(&mut next_frontier, next);
                    }
                }
            }
            frontier = next_frontier;
        }

        debug!(
            fields = fields.len(),
            frontier = frontier.len(),
            guarded = guard.is_some(),
            "added pattern"
        );

        let entry = MatchEntry { x, guard };
        for state in &frontier {
            if Arc::ptr_eq(state, &self.root) {
                let mut presumed = (**self.presumed.load()).clone();
                presumed.push(entry.clone());
                self.presumed.store(Arc::new(presumed));
            } else {
                state.add_match(entry.clone());
            }
        }
        build.pattern_count += 1;
    }

    /// Identifiers of every pattern the event's fields satisfy, each once.
    ///
    /// `fields` may come in any order; they are sorted by path here.
    pub fn matches_for_fields(&self, fields: &[Field]) -> Vec<X> {
        let mut sorted: Vec<&Field> = fields.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut bufs = NfaBuffers::new();
        let mut matched: Vec<MatchEntry<X>> = Vec::new();
        let mut failures: FxHashSet<u64> = FxHashSet::default();
        let mut arrived: FxHashSet<usize> = FxHashSet::default();
        let mut proposed: FxHashSet<(usize, usize)> = FxHashSet::default();

        let mut worklist: Vec<(Arc<FieldMatcher<X>>, usize)> =
            (0..sorted.len()).map(|i| (Arc::clone(&self.root), i)).collect();

        while let Some((state, index)) = worklist.pop() {
            if !proposed.insert((address(&state), index)) {
                continue;
            }
            let field = sorted[index];
            let reached = state.transition_on(&field.path, &field.val, &self.store, &mut bufs);
            for next in reached {
                if arrived.insert(address(&next)) {
                    let outcomes = next.load();
                    matched.extend(outcomes.matches.iter().cloned());
                    failures.extend(outcomes.exists_false_failures.iter().copied());
                }
                for (later, other) in sorted.iter().enumerate().skip(index + 1) {
                    if no_array_trail_conflict(&field.array_trail, &other.array_trail) {
                        worklist.push((Arc::clone(&next), later));
                    }
                }
            }
        }

        let presumed = self.presumed.load();
        let mut seen: FxHashSet<&X> = FxHashSet::default();
        let mut result = Vec::new();
        for entry in matched.iter().chain(presumed.iter()) {
            if entry.guard.is_some_and(|serial| failures.contains(&serial)) {
                continue;
            }
            if seen.insert(&entry.x) {
                result.push(entry.x.clone());
            }
        }
        result
    }

    /// Flatten a JSON event with the default flattener and match it.
    pub fn matches_for_json_event(&self, event: &[u8]) -> Result<Vec<X>, QuaminaError> {
        let fields = JsonFlattener::new().flatten(event, self)?;
        Ok(self.matches_for_fields(&fields))
    }

    /// Whether any pattern refers to this member name at any depth.
    pub fn is_name_used(&self, name: &str) -> bool {
        self.names_used.load().contains(name)
    }

    pub fn pattern_count(&self) -> usize {
        self.build_lock.lock().pattern_count
    }
}

impl<X: Clone + Eq + Hash> NameTracker for CoreMatcher<X> {
    fn is_name_used(&self, name: &str) -> bool {
        CoreMatcher::is_name_used(self, name)
    }
}

#[inline]
fn address<T>(arc: &Arc<T>) -> usize {
    Arc::as_ptr(arc) as usize
}

fn push_unique<T>(states: &mut Vec<Arc<T>>, state: Arc<T>) {
    if !states.iter().any(|existing| Arc::ptr_eq(existing, &state)) {
        states.push(state);
    }
}

/// Two fields can combine unless they sit at different positions of the same array.
pub fn no_array_trail_conflict(from: &[ArrayPos], to: &[ArrayPos]) -> bool {
    from.iter().all(|from_pos| {
        to.iter()
            .all(|to_pos| from_pos.array != to_pos.array || from_pos.pos == to_pos.pos)
    })
}
