//! Scenario: a placement commits exactly once.
//!
//! GREEN when:
//! - dispatch moves the slot to `placing` and publishes `p<ch>c` on the
//!   tier's command topic without touching inventory or the ledger;
//! - the first `ocupado` commits one record, one `Ingreso` and one
//!   persist effect of each kind;
//! - a redelivered `ocupado` is reported as a duplicate and changes nothing;
//! - `ocupado` for a slot nobody is placing into is dropped as stale.

use rns_core::{CommandRejected, Disposition, Effect, MovementAction, SlotStatus};
use rns_testkit::Harness;

#[test]
fn placement_commits_on_first_confirmation_only() {
    let mut h = Harness::identity("A", 2, 4);

    let out = h.place("A-1-2", "SKU-7", 3).expect("placement accepted");
    assert_eq!(h.status("A-1-2"), SlotStatus::Placing);
    let published: Vec<_> = out.publishes().collect();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "Entrada/T1");
    assert_eq!(published[0].payload, "p2c");
    assert!(h.engine.records().is_empty());
    assert!(h.engine.movements().is_empty());
    assert!(h.writes.is_empty());

    let first = h.report_slot("A-1-2", "ocupado");
    assert!(matches!(
        first.entries.as_slice(),
        [Disposition::PlacementCommitted { sku, record_id, .. }]
            if sku == "SKU-7" && record_id == "SKU-7-A-1-2"
    ));
    assert_eq!(h.status("A-1-2"), SlotStatus::Occupied);

    let second = h.report_slot("A-1-2", "ocupado");
    assert!(matches!(
        second.entries.as_slice(),
        [Disposition::DuplicateConfirmation { .. }]
    ));
    assert!(second.outcome.effects.is_empty());

    assert_eq!(h.engine.records().len(), 1);
    let ingresos: Vec<_> = h
        .movements_for("SKU-7")
        .into_iter()
        .filter(|m| m.action == MovementAction::Ingreso)
        .collect();
    assert_eq!(ingresos.len(), 1);
    assert_eq!(ingresos[0].location, "A-1-2");
    assert_eq!(ingresos[0].quantity, 3);

    let persisted = h
        .writes
        .iter()
        .filter(|e| matches!(e, Effect::PersistRecord { .. }))
        .count();
    assert_eq!(persisted, 1);
    h.assert_invariants();
}

#[test]
fn occupied_slot_refuses_a_second_placement() {
    let mut h = Harness::identity("A", 1, 4);
    h.place("A-1-1", "SKU-1", 1).expect("first placement");
    h.report_slot("A-1-1", "ocupado");

    let err = h.place("A-1-1", "SKU-2", 1).unwrap_err();
    assert!(matches!(
        err,
        CommandRejected::SlotNotFree {
            status: SlotStatus::Occupied,
            ..
        }
    ));
    assert_eq!(h.published.len(), 1, "rejection must not publish");
    h.assert_invariants();
}

#[test]
fn placing_slot_refuses_a_second_placement() {
    let mut h = Harness::identity("A", 1, 4);
    h.place("A-1-1", "SKU-1", 1).expect("first placement");
    let err = h.place("A-1-1", "SKU-2", 1).unwrap_err();
    assert_eq!(err.reason_code(), "slot_not_free");
}

#[test]
fn sku_in_flight_or_stored_is_rejected_elsewhere() {
    let mut h = Harness::identity("A", 1, 4);
    h.place("A-1-1", "SKU-1", 1).expect("first placement");

    // still placing
    let err = h.place("A-1-2", "SKU-1", 1).unwrap_err();
    assert!(matches!(err, CommandRejected::DuplicateSku { .. }));

    h.report_slot("A-1-1", "ocupado");
    let err = h.place("A-1-3", " SKU-1 ", 1).unwrap_err();
    assert!(matches!(err, CommandRejected::DuplicateSku { .. }));
    assert_eq!(h.status("A-1-2"), SlotStatus::Free);
    assert_eq!(h.status("A-1-3"), SlotStatus::Free);
}

#[test]
fn unsolicited_confirmation_is_stale() {
    let mut h = Harness::identity("A", 1, 4);

    let report = h.report_slot("A-1-4", "ocupado");
    assert!(matches!(
        report.entries.as_slice(),
        [Disposition::StaleConfirmation {
            current: SlotStatus::Free,
            reported: SlotStatus::Occupied,
            ..
        }]
    ));
    assert_eq!(h.status("A-1-4"), SlotStatus::Free);
    assert!(h.engine.records().is_empty());

    // `libre` while placing is stale as well; the placement stays pending
    h.place("A-1-4", "SKU-4", 2).expect("placement");
    let report = h.report_slot("A-1-4", "libre");
    assert!(matches!(
        report.entries.as_slice(),
        [Disposition::StaleConfirmation { .. }]
    ));
    assert_eq!(h.status("A-1-4"), SlotStatus::Placing);
    h.assert_invariants();
}

#[test]
fn unknown_channel_and_unknown_estado_are_classified() {
    let mut h = Harness::identity("A", 1, 4);
    let report = h.report("T1", 9, "ocupado");
    assert!(matches!(
        report.entries.as_slice(),
        [Disposition::UnresolvedTopology { channel: 9, .. }]
    ));

    let report = h.report("T1", 1, "averiado");
    assert!(matches!(
        report.entries.as_slice(),
        [Disposition::UnrecognizedStatus { estado, .. }] if estado == "averiado"
    ));
    assert_eq!(h.status("A-1-1"), SlotStatus::Free);
}
