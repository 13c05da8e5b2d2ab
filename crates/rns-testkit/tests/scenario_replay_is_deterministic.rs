//! Scenario: replaying the same JSONL against a fresh station yields the
//! same report, byte for byte.

use rns_testkit::{parse_replay, run_replay, Harness};

const SESSION: &str = r#"
# stock station, rack A tier 1 is controller L3
{"op":"admission","admit":true}
{"op":"place","slot":"A-1-1","sku":"SKU-1","name":"Tornillo","quantity":5}
{"op":"place","slot":"A-1-2","sku":"SKU-2","name":"Tuerca","quantity":9}
{"op":"hardware","topic":"rack/L3/buttons/states","payload":{"p14":{"estado":"ocupado"},"p12":{"estado":"ocupado"}}}
{"op":"hardware","topic":"rack/L3/buttons/states","payload":"{\"p14\":{\"estado\":\"ocupado\"}}"}
{"op":"edit","record_id":"SKU-2-A-1-2","quantity":7}
{"op":"remove","sku":"SKU-1"}
{"op":"hardware","topic":"rack/L3/buttons/states","payload":{"p14":{"estado":"libre"}}}
{"op":"hardware","topic":"rack/L3/system/state","payload":"online"}
{"op":"place","slot":"B-1-1","sku":"SKU-3","name":"Perno","quantity":1}
{"op":"clear_rack","rack":"A"}
"#;

fn replay() -> serde_json::Value {
    let steps = parse_replay(SESSION).expect("parse");
    let mut h = Harness::stock();
    let report = run_replay(&mut h, steps);
    serde_json::to_value(&report).expect("serialize")
}

#[test]
fn same_input_same_report() {
    assert_eq!(replay(), replay());
}

#[test]
fn session_outcome_is_as_recorded() {
    let steps = parse_replay(SESSION).expect("parse");
    let mut h = Harness::stock();
    let report = run_replay(&mut h, steps);

    let reasons: Vec<_> = report
        .steps
        .iter()
        .map(|s| s.reason.clone().unwrap_or_default())
        .collect();
    assert_eq!(reasons[9], "unwired");
    assert!(report.steps.iter().take(9).all(|s| s.accepted));

    // line numbers count the leading blank and comment lines
    assert_eq!(report.steps[0].line, 3);
    assert_eq!(report.steps[0].published[0].payload, "8113");

    // redelivered `ocupado` after the commit is a duplicate
    let dup = &report.steps[4];
    assert!(dup.dispositions.iter().all(|d| !d.is_commit()));

    assert!(report.slots.is_empty());
    assert!(report.records.is_empty());
    assert!(report.violations.is_empty());
    // newest first
    let labels: Vec<_> = report
        .movements
        .iter()
        .map(|m| m.action.as_str())
        .collect();
    assert_eq!(
        labels,
        vec!["Egreso", "Egreso", "Edición", "Ingreso", "Ingreso"]
    );
}
