//! Smoke run for quamina-core: one pattern set per operator, each checked
//! against a few events.

use quamina_core::Quamina;

fn main() {
    println!("quamina-core smoke run\n");

    numbers_across_spellings();
    trails_keep_array_members_apart();
    absent_field_beside_present_ones();
    globs_and_prefixes();
    case_folding_and_exclusion();
    adds_during_matching();

    println!("\ndone");
}

/// Match every event against `q` and compare the sorted identifiers.
fn check(q: &Quamina<&'static str>, cases: &[(&str, &[&'static str])]) {
    for (event, want) in cases {
        let mut got = q.matches_for_event(event.as_bytes()).unwrap();
        got.sort_unstable();
        assert_eq!(&got, want, "{event}");
    }
}

fn numbers_across_spellings() {
    let q = Quamina::new();
    q.add_pattern("thirty", r#"{"temp": [30]}"#).unwrap();
    q.add_pattern("tiny", r#"{"temp": [0.000001]}"#).unwrap();

    check(
        &q,
        &[
            (r#"{"temp": 30}"#, &["thirty"]),
            (r#"{"temp": 3.0e1}"#, &["thirty"]),
            (r#"{"temp": 300E-1}"#, &["thirty"]),
            (r#"{"temp": 1e-6}"#, &["tiny"]),
            (r#"{"temp": 0.0000011}"#, &[]),
            (r#"{"temp": "30"}"#, &[]),
        ],
    );
    println!("ok  numbers match by value, not spelling");
}

fn trails_keep_array_members_apart() {
    let q = Quamina::new();
    q.add_pattern(
        "red-large",
        r#"{"items": {"color": ["red"], "size": ["L"]}}"#,
    )
    .unwrap();

    check(
        &q,
        &[
            (
                r#"{"items": [{"color": "red", "size": "S"}, {"color": "blue", "size": "L"}]}"#,
                &[],
            ),
            (
                r#"{"items": [{"color": "blue", "size": "S"}, {"color": "red", "size": "L"}]}"#,
                &["red-large"],
            ),
        ],
    );
    println!("ok  fields from different array members never combine");
}

fn absent_field_beside_present_ones() {
    let q = Quamina::new();
    q.add_pattern(
        "unassigned-bug",
        r#"{"kind": ["bug"], "owner": [{"exists": false}]}"#,
    )
    .unwrap();
    q.add_pattern("owned", r#"{"owner": [{"exists": true}]}"#)
        .unwrap();

    check(
        &q,
        &[
            (r#"{"kind": "bug"}"#, &["unassigned-bug"]),
            (r#"{"kind": "bug", "owner": "sam"}"#, &["owned"]),
            (r#"{"kind": "task"}"#, &[]),
        ],
    );
    println!("ok  exists:false holds only while the field is missing");
}

fn globs_and_prefixes() {
    let q = Quamina::new();
    q.add_pattern("logs", r#"{"key": [{"shellstyle": "logs/*.gz"}]}"#)
        .unwrap();
    q.add_pattern("under-logs", r#"{"key": [{"prefix": "logs/"}]}"#)
        .unwrap();

    check(
        &q,
        &[
            (r#"{"key": "logs/2024/01.gz"}"#, &["logs", "under-logs"]),
            (r#"{"key": "logs/readme"}"#, &["under-logs"]),
            (r#"{"key": "data/x.gz"}"#, &[]),
        ],
    );
    println!("ok  shellstyle and prefix share one value automaton");
}

fn case_folding_and_exclusion() {
    let q = Quamina::new();
    q.add_pattern("eu", r#"{"region": [{"equals-ignore-case": "EU-West"}]}"#)
        .unwrap();
    q.add_pattern(
        "not-test",
        r#"{"meta": {"stage": [{"anything-but": ["test", "dev"]}]}}"#,
    )
    .unwrap();

    check(
        &q,
        &[
            (r#"{"region": "eu-west"}"#, &["eu"]),
            (r#"{"region": "EU-WEST", "meta": {"stage": "prod"}}"#, &["eu", "not-test"]),
            (r#"{"meta": {"stage": "dev"}}"#, &[]),
        ],
    );
    println!("ok  case folding and anything-but");
}

fn adds_during_matching() {
    let q = Quamina::<String>::new();
    std::thread::scope(|s| {
        let writer = q.clone();
        s.spawn(move || {
            for i in 0..300 {
                writer
                    .add_pattern(format!("order-{i}"), &format!(r#"{{"order": [{i}]}}"#))
                    .unwrap();
            }
        });
        let reader = q.clone();
        s.spawn(move || {
            for i in (0..300).rev() {
                let event = format!(r#"{{"order": {i}.0}}"#);
                let got = reader.matches_for_event(event.as_bytes()).unwrap();
                assert!(got.is_empty() || got == vec![format!("order-{i}")]);
            }
        });
    });
    assert_eq!(q.pattern_count(), 300);
    println!("ok  matching runs while patterns are added");
}
