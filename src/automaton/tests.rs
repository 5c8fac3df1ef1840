use super::*;
use crate::flattener::{ArrayPos, Field};
use crate::pattern::{PatternField, TypedValue};
use crate::QuaminaError;
use std::sync::Arc;

fn build_state() -> BuildState<&'static str> {
    BuildState::new(Arc::new(StateStore::new()))
}

fn quoted(s: &str) -> Vec<u8> {
    format!("\"{s}\"").into_bytes()
}

fn dfa_hits(store: &StateStore<&'static str>, start: StateId, val: &[u8]) -> usize {
    let mut transitions = Vec::new();
    traverse_dfa(store, start, val, &mut transitions);
    transitions.len()
}

fn nfa_hits(store: &StateStore<&'static str>, start: StateId, val: &[u8]) -> usize {
    let mut transitions = Vec::new();
    let mut bufs = NfaBuffers::new();
    traverse_nfa(store, start, val, &mut bufs, &mut transitions);
    transitions.len()
}

fn value_targets(
    vm: &ValueMatcher<&'static str>,
    store: &StateStore<&'static str>,
    val: &[u8],
) -> Transitions<&'static str> {
    vm.transition_on(val, store, &mut NfaBuffers::new())
}

#[test]
fn test_string_fa() {
    let store = StateStore::new();
    let start = make_string_fa(&store, b"abc", Arc::new(FieldMatcher::new()));

    assert_eq!(dfa_hits(&store, start, b"abc"), 1);
    assert_eq!(dfa_hits(&store, start, b"abd"), 0);
    assert_eq!(dfa_hits(&store, start, b"ab"), 0);
    assert_eq!(dfa_hits(&store, start, b"abcd"), 0);
}

#[test]
fn test_prefix_fa() {
    let store = StateStore::new();
    let start = make_prefix_fa(&store, b"ab", Arc::new(FieldMatcher::new()));

    assert_eq!(dfa_hits(&store, start, b"ab"), 1);
    assert_eq!(dfa_hits(&store, start, b"abcd"), 1);
    assert_eq!(dfa_hits(&store, start, b"a"), 0);
    assert_eq!(dfa_hits(&store, start, b"ba"), 0);
}

#[test]
fn test_monocase_fa() {
    let store = StateStore::new();
    let start = make_monocase_fa(&store, "\"Ab\u{e9}\"".as_bytes(), Arc::new(FieldMatcher::new()));

    for hit in ["\"ab\u{e9}\"", "\"AB\u{c9}\"", "\"aB\u{e9}\""] {
        assert_eq!(dfa_hits(&store, start, hit.as_bytes()), 1, "{hit}");
    }
    assert_eq!(dfa_hits(&store, start, b"\"abe\""), 0);
    assert_eq!(dfa_hits(&store, start, b"\"ab\""), 0);
}

#[test]
fn test_anything_but_fa() {
    let store = StateStore::new();
    let excluded = vec![quoted("foo"), quoted("fo")];
    let start = make_anything_but_fa(&store, &excluded, Arc::new(FieldMatcher::new()));

    assert_eq!(dfa_hits(&store, start, b"\"foo\""), 0);
    assert_eq!(dfa_hits(&store, start, b"\"fo\""), 0);
    assert_eq!(dfa_hits(&store, start, b"\"f\""), 1);
    assert_eq!(dfa_hits(&store, start, b"\"food\""), 1);
    assert_eq!(dfa_hits(&store, start, b"\"bar\""), 1);
}

#[test]
fn test_shellstyle_fa() {
    let store = StateStore::new();
    let mut interner = StepListInterner::new();
    let start = make_shellstyle_fa(
        &store,
        &mut interner,
        b"\"ab*cd\"",
        Arc::new(FieldMatcher::new()),
    );

    for hit in ["\"abcd\"", "\"abXXXcd\"", "\"abcdcd\"", "\"abccd\""] {
        assert_eq!(nfa_hits(&store, start, hit.as_bytes()), 1, "{hit}");
    }
    for miss in ["\"abcde\"", "\"Xabcd\"", "\"abc\"", "\"ab\""] {
        assert_eq!(nfa_hits(&store, start, miss.as_bytes()), 0, "{miss}");
    }
}

#[test]
fn test_shellstyle_fa_glob_state_is_shared() {
    let store = StateStore::new();
    let mut interner = StepListInterner::new();
    let start = make_shellstyle_fa(
        &store,
        &mut interner,
        b"\"*x\"",
        Arc::new(FieldMatcher::new()),
    );

    let (_, before, _) = store.sizes();
    // a long run through the glob allocates nothing
    let long = format!("\"{}x\"", "y".repeat(10_000));
    assert_eq!(nfa_hits(&store, start, long.as_bytes()), 1);
    assert_eq!(store.sizes().1, before);
}

#[test]
fn test_merge_dfas_keeps_both_values() {
    let store = StateStore::new();
    let foo = Arc::new(FieldMatcher::new());
    let football = Arc::new(FieldMatcher::new());
    let a = make_string_fa(&store, &quoted("foo"), Arc::clone(&foo));
    let b = make_string_fa(&store, &quoted("football"), Arc::clone(&football));
    let merged = merge_dfas(&store, a, b);

    let mut out = Vec::new();
    traverse_dfa(&store, merged, &quoted("foo"), &mut out);
    assert_eq!(out.len(), 1);
    assert!(Arc::ptr_eq(&out[0], &foo));

    out.clear();
    traverse_dfa(&store, merged, &quoted("football"), &mut out);
    assert_eq!(out.len(), 1);
    assert!(Arc::ptr_eq(&out[0], &football));

    assert_eq!(dfa_hits(&store, merged, &quoted("foot")), 0);
}

#[test]
fn test_merge_dfa_with_itself_is_identity() {
    let store: StateStore<&'static str> = StateStore::new();
    let a = make_string_fa(&store, b"abc", Arc::new(FieldMatcher::new()));
    assert_eq!(merge_dfas(&store, a, a), a);
}

#[test]
fn test_dfa_to_nfa_is_equivalent() {
    let store = StateStore::new();
    let mut interner = StepListInterner::new();
    let a = make_string_fa(&store, b"one", Arc::new(FieldMatcher::new()));
    let b = make_prefix_fa(&store, b"tw", Arc::new(FieldMatcher::new()));
    let dfa = merge_dfas(&store, a, b);
    let nfa = dfa_to_nfa(&store, &mut interner, dfa);

    let vals: [&[u8]; 6] = [b"one", b"two", b"tw", b"on", b"three", b""];
    for val in vals {
        assert_eq!(dfa_hits(&store, dfa, val), nfa_hits(&store, nfa, val), "{val:?}");
    }
}

#[test]
fn test_merge_nfas_with_cycles() {
    let store = StateStore::new();
    let mut interner = StepListInterner::new();
    let first = make_shellstyle_fa(&store, &mut interner, b"\"a*\"", Arc::new(FieldMatcher::new()));
    let second = make_shellstyle_fa(&store, &mut interner, b"\"*z\"", Arc::new(FieldMatcher::new()));
    let merged = merge_nfas(&store, &mut interner, first, second);

    assert_eq!(nfa_hits(&store, merged, b"\"abz\""), 2);
    assert_eq!(nfa_hits(&store, merged, b"\"ab\""), 1);
    assert_eq!(nfa_hits(&store, merged, b"\"bz\""), 1);
    assert_eq!(nfa_hits(&store, merged, b"\"b\""), 0);
}

#[test]
fn test_value_matcher_singleton_then_dfa_then_nfa() {
    let mut build = build_state();
    let store = Arc::clone(&build.store);
    let vm = ValueMatcher::new();

    let foo = vm.add_transition(&TypedValue::String(quoted("foo")), &mut build);
    assert!(vm.is_singleton());
    assert!(!vm.is_nondeterministic());

    let bar = vm.add_transition(&TypedValue::String(quoted("bar")), &mut build);
    assert!(!vm.is_singleton());
    assert!(!vm.is_nondeterministic());

    let glob = vm.add_transition(&TypedValue::Shellstyle(b"\"b*\"".to_vec()), &mut build);
    assert!(vm.is_nondeterministic());

    let hits = value_targets(&vm, &store, &quoted("foo"));
    assert_eq!(hits.len(), 1);
    assert!(Arc::ptr_eq(&hits[0], &foo));

    let hits = value_targets(&vm, &store, &quoted("bar"));
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().any(|fm| Arc::ptr_eq(fm, &bar)));
    assert!(hits.iter().any(|fm| Arc::ptr_eq(fm, &glob)));

    assert!(value_targets(&vm, &store, &quoted("baz"))
        .iter()
        .all(|fm| Arc::ptr_eq(fm, &glob)));
}

#[test]
fn test_duplicate_literal_is_idempotent() {
    let mut build = build_state();
    let vm = ValueMatcher::new();

    let first = vm.add_transition(&TypedValue::String(quoted("x")), &mut build);
    let again = vm.add_transition(&TypedValue::String(quoted("x")), &mut build);
    assert!(Arc::ptr_eq(&first, &again));
    assert!(vm.is_singleton());

    vm.add_transition(&TypedValue::String(quoted("y")), &mut build);
    let after_merge = vm.add_transition(&TypedValue::String(quoted("x")), &mut build);
    assert!(Arc::ptr_eq(&first, &after_merge));
}

#[test]
fn test_exists_always_gets_a_new_target() {
    let mut build = build_state();
    let store = Arc::clone(&build.store);
    let vm = ValueMatcher::new();

    let first = vm.add_transition(&TypedValue::Exists(true), &mut build);
    let second = vm.add_transition(&TypedValue::Exists(true), &mut build);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(value_targets(&vm, &store, b"anything").len(), 2);
}

#[test]
fn test_equal_numbers_share_a_target() {
    let mut build = build_state();
    let store = Arc::clone(&build.store);
    let vm = ValueMatcher::new();
    let number = |text: &str| TypedValue::Number {
        text: text.as_bytes().to_vec(),
        canonical: crate::numbers::canonicalize(text.as_bytes()).unwrap(),
    };

    let three = vm.add_transition(&number("3"), &mut build);
    let again = vm.add_transition(&number("3.0"), &mut build);
    assert!(Arc::ptr_eq(&three, &again));

    let hits = value_targets(&vm, &store, b"30e-1");
    assert_eq!(hits.len(), 1);
    assert!(Arc::ptr_eq(&hits[0], &three));
}

#[test]
fn test_field_matcher_fans_out_over_values() {
    let mut build = build_state();
    let fm = FieldMatcher::new();
    let field = PatternField::new(
        "a",
        vec![
            TypedValue::String(quoted("x")),
            TypedValue::String(quoted("y")),
            TypedValue::String(quoted("x")),
        ],
    );

    let next = fm.add_transition(&field, &mut build);
    assert_eq!(next.len(), 2);
    assert_eq!(fm.paths(), vec![b"a".to_vec()]);
}

fn compiled(patterns: &[(&'static str, &str)]) -> CoreMatcher<&'static str> {
    let matcher = CoreMatcher::new();
    for (name, pattern) in patterns {
        matcher.add_pattern(*name, pattern).unwrap();
    }
    matcher
}

fn sorted(mut ids: Vec<&'static str>) -> Vec<&'static str> {
    ids.sort_unstable();
    ids
}

#[test]
fn test_prefix_overlap_does_not_cross_match() {
    let m = compiled(&[
        ("p1", r#"{"a": ["foo"]}"#),
        ("p2", r#"{"a": ["football"]}"#),
        ("p3", r#"{"a": ["footballer"]}"#),
    ]);

    assert_eq!(m.matches_for_json_event(br#"{"a": "foo"}"#).unwrap(), vec!["p1"]);
    assert_eq!(m.matches_for_json_event(br#"{"a": "football"}"#).unwrap(), vec!["p2"]);
    assert_eq!(m.matches_for_json_event(br#"{"a": "footballer"}"#).unwrap(), vec!["p3"]);
    assert!(m.matches_for_json_event(br#"{"a": "foot"}"#).unwrap().is_empty());
}

#[test]
fn test_array_trail_isolation() {
    let m = compiled(&[
        ("wrong", r#"{"bands": {"given": ["Wata"], "role": ["drums"]}}"#),
        ("right", r#"{"bands": {"given": ["Wata"], "role": ["guitar"]}}"#),
    ]);
    let event = br#"{"bands": [{"given": "Wata", "role": ["guitar"]}, {"given": "Mick", "role": ["drums"]}]}"#;

    assert_eq!(m.matches_for_json_event(event).unwrap(), vec!["right"]);
}

#[test]
fn test_no_array_trail_conflict() {
    let pos = |array, pos| ArrayPos { array, pos };
    assert!(no_array_trail_conflict(&[], &[pos(0, 1)]));
    assert!(no_array_trail_conflict(&[pos(0, 1)], &[pos(0, 1), pos(1, 0)]));
    assert!(no_array_trail_conflict(&[pos(0, 1)], &[pos(2, 3)]));
    assert!(!no_array_trail_conflict(&[pos(0, 1)], &[pos(0, 2)]));
}

#[test]
fn test_field_order_does_not_matter() {
    let m = compiled(&[("p1", r#"{"a": ["1"], "b": ["2"], "c": ["3"]}"#)]);
    let field = |path: &str, val: &str| Field::new(path, quoted(val));

    let in_order = vec![field("a", "1"), field("b", "2"), field("c", "3")];
    let shuffled = vec![field("c", "3"), field("a", "1"), field("b", "2")];
    assert_eq!(m.matches_for_fields(&in_order), vec!["p1"]);
    assert_eq!(m.matches_for_fields(&shuffled), vec!["p1"]);

    let missing = vec![field("c", "3"), field("a", "1")];
    assert!(m.matches_for_fields(&missing).is_empty());
}

#[test]
fn test_fields_with_trails() {
    let m = compiled(&[("p1", r#"{"x": ["1"], "y": ["2"]}"#)]);
    let pos = |array, pos| ArrayPos { array, pos };

    let apart = vec![
        Field::new("x", quoted("1")).with_trail(vec![pos(0, 0)]),
        Field::new("y", quoted("2")).with_trail(vec![pos(0, 1)]),
    ];
    assert!(m.matches_for_fields(&apart).is_empty());

    let together = vec![
        Field::new("x", quoted("1")).with_trail(vec![pos(0, 1)]),
        Field::new("y", quoted("2")).with_trail(vec![pos(0, 1)]),
    ];
    assert_eq!(m.matches_for_fields(&together), vec!["p1"]);
}

#[test]
fn test_exists_false_only_pattern_matches_empty_event() {
    let m = compiled(&[("absent", r#"{"a": [{"exists": false}]}"#)]);
    assert_eq!(m.matches_for_fields(&[]), vec!["absent"]);
    assert!(m
        .matches_for_fields(&[Field::new("a", quoted("v"))])
        .is_empty());
}

#[test]
fn test_multi_valued_field_threads_into_later_fields() {
    let m = compiled(&[("p1", r#"{"a": ["x", "y"], "b": ["z"]}"#)]);
    assert_eq!(m.matches_for_json_event(br#"{"a": "y", "b": "z"}"#).unwrap(), vec!["p1"]);
    assert_eq!(m.matches_for_json_event(br#"{"a": "x", "b": "z"}"#).unwrap(), vec!["p1"]);
    assert!(m.matches_for_json_event(br#"{"a": "x"}"#).unwrap().is_empty());
}

#[test]
fn test_patterns_share_prefix_states() {
    let m = compiled(&[
        ("p1", r#"{"a": ["x"], "b": ["1"]}"#),
        ("p2", r#"{"a": ["x"], "b": ["2"]}"#),
        ("p3", r#"{"a": ["x"]}"#),
    ]);

    assert_eq!(
        sorted(m.matches_for_json_event(br#"{"a": "x", "b": "1"}"#).unwrap()),
        vec!["p1", "p3"]
    );
    assert_eq!(
        sorted(m.matches_for_json_event(br#"{"a": "x", "b": "2"}"#).unwrap()),
        vec!["p2", "p3"]
    );
}

#[test]
fn test_add_pattern_fields_directly() {
    let m = CoreMatcher::new();
    m.add_pattern_fields(
        "p1",
        vec![PatternField::new("k\nv", vec![TypedValue::Literal(b"true".to_vec())])],
    )
    .unwrap();
    assert!(m.is_name_used("k"));
    assert!(m.is_name_used("v"));
    assert_eq!(m.matches_for_json_event(br#"{"k": {"v": true}}"#).unwrap(), vec!["p1"]);
    assert!(m.add_pattern_fields("p2", Vec::new()).is_err());
}

#[test]
fn test_rejected_pattern_changes_nothing() {
    let m = compiled(&[("p1", r#"{"a": ["x"]}"#)]);
    assert!(m.add_pattern("p2", r#"{"b": [{"shellstyle": "*x*"}]}"#).is_err());
    assert!(!m.is_name_used("b"));
    assert_eq!(m.pattern_count(), 1);
}

#[test]
fn test_long_values_merge_as_dfas() {
    let store = StateStore::new();
    let long = "a".repeat(100_000);
    let plain = Arc::new(FieldMatcher::new());
    let extended = Arc::new(FieldMatcher::new());
    let a = make_string_fa(&store, &quoted(&long), Arc::clone(&plain));
    let b = make_string_fa(&store, &quoted(&format!("{long}b")), Arc::clone(&extended));
    let merged = merge_dfas(&store, a, b);

    assert_eq!(dfa_hits(&store, merged, &quoted(&long)), 1);
    assert_eq!(dfa_hits(&store, merged, &quoted(&format!("{long}b"))), 1);
    assert_eq!(dfa_hits(&store, merged, &quoted(&format!("{long}c"))), 0);
}

#[test]
fn test_long_values_merge_as_nfas() {
    let store = StateStore::new();
    let mut interner = StepListInterner::new();
    let long = "a".repeat(100_000);
    let literal = make_string_fa(&store, &quoted(&long), Arc::new(FieldMatcher::new()));
    let lifted = dfa_to_nfa(&store, &mut interner, literal);
    let glob = make_shellstyle_fa(&store, &mut interner, b"\"a*b\"", Arc::new(FieldMatcher::new()));
    let merged = merge_nfas(&store, &mut interner, lifted, glob);

    assert_eq!(nfa_hits(&store, merged, &quoted(&long)), 1);
    assert_eq!(nfa_hits(&store, merged, &quoted(&format!("{long}b"))), 1);
    assert_eq!(nfa_hits(&store, merged, &quoted(&format!("{long}c"))), 0);
    assert_eq!(nfa_hits(&store, merged, b"\"b\""), 0);
}

#[test]
fn test_long_anything_but_value() {
    let store = StateStore::new();
    let long = "a".repeat(100_000);
    let start = make_anything_but_fa(&store, &[quoted(&long)], Arc::new(FieldMatcher::new()));

    assert_eq!(dfa_hits(&store, start, &quoted(&long)), 0);
    assert_eq!(dfa_hits(&store, start, &quoted(&long[1..])), 1);
    assert_eq!(dfa_hits(&store, start, &quoted(&format!("{long}a"))), 1);
}

#[test]
fn test_long_values_through_the_matcher() {
    let long = "x".repeat(100_000);
    let m = CoreMatcher::new();
    m.add_pattern("exact", &format!(r#"{{"a": ["{long}"]}}"#)).unwrap();
    m.add_pattern("longer", &format!(r#"{{"a": ["{long}y"]}}"#)).unwrap();
    m.add_pattern("glob", r#"{"a": [{"shellstyle": "x*y"}]}"#).unwrap();

    let event = |v: &str| format!(r#"{{"a": "{v}"}}"#);
    assert_eq!(m.matches_for_json_event(event(&long).as_bytes()).unwrap(), vec!["exact"]);
    assert_eq!(
        sorted(m.matches_for_json_event(event(&format!("{long}y")).as_bytes()).unwrap()),
        vec!["glob", "longer"]
    );
}

#[test]
fn test_add_pattern_fields_applies_parser_rules() {
    let m = CoreMatcher::new();
    let rejected = [
        PatternField::new("a", vec![TypedValue::Shellstyle(b"\"a*b*c\"".to_vec())]),
        PatternField::new(
            "a",
            vec![TypedValue::Exists(false), TypedValue::String(quoted("v"))],
        ),
        PatternField::new("a", vec![TypedValue::AnythingBut(Vec::new())]),
        PatternField::new("a", Vec::new()),
        PatternField::new(
            "a",
            vec![TypedValue::Number {
                text: b"3".to_vec(),
                canonical: b"#0".to_vec(),
            }],
        ),
    ];
    for field in rejected {
        let err = m.add_pattern_fields("p", vec![field.clone()]);
        assert!(matches!(err, Err(QuaminaError::InvalidPattern(_))), "{field:?}");
    }
    assert_eq!(m.pattern_count(), 0);
    assert!(!m.is_name_used("a"));

    m.add_pattern_fields(
        "ok",
        vec![PatternField::new("a", vec![TypedValue::Shellstyle(b"\"a*\"".to_vec())])],
    )
    .unwrap();
    assert_eq!(m.matches_for_json_event(br#"{"a": "abc"}"#).unwrap(), vec!["ok"]);
}
