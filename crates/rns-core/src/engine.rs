//! Slot reconciliation engine.
//!
//! # Design
//!
//! [`SlotEngine`] owns every piece of mutable state (slot store, inventory,
//! pending queues, dedup guard, movement ledger). It is driven from exactly two
//! directions:
//!
//! - **Local commands** (`request_*`, `clear_rack`, `set_admission`) validate,
//!   optimistically mutate and return the [`Effect`]s the caller must carry
//!   out (publish, persistence writes). Rejections are typed and side-effect
//!   free.
//! - **Inbound messages** ([`SlotEngine::handle_message`]) are reconciled one
//!   channel entry at a time. Every entry yields a [`Disposition`]; only
//!   commits change state.
//!
//! The engine performs no IO and reads no clock: callers pass `now`.
//!
//! # Invariants
//!
//! 1. A slot is `occupied` iff exactly one record references it (`removing`
//!    slots keep their record until the removal commits).
//! 2. A `placing` slot has exactly one pending placement and no record.
//! 3. A `removing` slot is in pending removals and still has its record.
//! 4. The dedup guard never holds a `free` slot.
//! 5. Every commit appends exactly one movement.
//!
//! [`SlotEngine::check_invariants`] verifies 1–4 against the live state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CommandRejected, InvariantViolation};
use crate::inventory::{Inventory, InventoryRecord, ProductDraft, RecordEdit};
use crate::ledger::{MovementAction, MovementLedger, MovementRecord};
use crate::pending::{DedupGuard, PendingPlacement, PendingPlacements, PendingRemovals};
use crate::slot::{Slot, SlotChange, SlotId, SlotStatus, SlotStore, Trigger};
use crate::topology::{CommandKind, Layout, OutboundCommand, Topology, TopicKind, TopologyError};
use crate::wire::{parse_estado, parse_status_payload, InboundMessage};

/// Movement user label when none is configured.
pub const DEFAULT_OPERATOR: &str = "Admin";

/// `quantity <= threshold` counts as low stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

// ---------------------------------------------------------------------------
// Effects and outcomes
// ---------------------------------------------------------------------------

/// Side effect the caller must perform after a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    Publish { command: OutboundCommand },
    PersistRecord { record: InventoryRecord },
    UpdateRecord { record: InventoryRecord },
    DeleteRecord { sku: String },
    PersistMovement { movement: MovementRecord },
}

/// Everything a successful command or commit produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub effects: Vec<Effect>,
    pub changes: Vec<SlotChange>,
}

impl Outcome {
    fn merge(&mut self, other: Outcome) {
        self.effects.extend(other.effects);
        self.changes.extend(other.changes);
    }

    pub fn movements(&self) -> impl Iterator<Item = &MovementRecord> {
        self.effects.iter().filter_map(|e| match e {
            Effect::PersistMovement { movement } => Some(movement),
            _ => None,
        })
    }

    pub fn publishes(&self) -> impl Iterator<Item = &OutboundCommand> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Publish { command } => Some(command),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Reconciliation report
// ---------------------------------------------------------------------------

/// How one channel entry of a status payload was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    PlacementCommitted {
        slot: SlotId,
        record_id: String,
        sku: String,
    },
    RemovalCommitted {
        slot: SlotId,
        sku: Option<String>,
    },
    /// Reported status equals the current one.
    Unchanged { slot: SlotId, status: SlotStatus },
    /// Report that would break a slot invariant; dropped.
    StaleConfirmation {
        slot: SlotId,
        current: SlotStatus,
        reported: SlotStatus,
    },
    /// Redelivered `ocupado` for a placement that already committed.
    DuplicateConfirmation { slot: SlotId },
    UnresolvedTopology { tier_id: String, channel: u16 },
    UnrecognizedStatus { slot: SlotId, estado: String },
}

impl Disposition {
    pub fn is_commit(&self) -> bool {
        matches!(
            self,
            Disposition::PlacementCommitted { .. } | Disposition::RemovalCommitted { .. }
        )
    }
}

/// What the inbound topic turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Status { tier_id: String },
    SystemState { tier_id: String, payload: String },
    CommandEcho { tier_id: String, payload: String },
    MalformedPayload { tier_id: String, error: String },
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub topic: String,
    pub observation: Observation,
    pub entries: Vec<Disposition>,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Hydration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationSkip {
    pub record_id: String,
    pub sku: String,
    pub slot: SlotId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationReport {
    pub bound: usize,
    pub skipped: Vec<HydrationSkip>,
    pub movements_loaded: usize,
    pub changes: Vec<SlotChange>,
}

// ---------------------------------------------------------------------------
// Query views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub free: usize,
    pub placing: usize,
    pub occupied: usize,
    pub removing: usize,
}

impl StatusCounts {
    fn add(&mut self, status: SlotStatus) {
        match status {
            SlotStatus::Free => self.free += 1,
            SlotStatus::Placing => self.placing += 1,
            SlotStatus::Occupied => self.occupied += 1,
            SlotStatus::Removing => self.removing += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.free + self.placing + self.occupied + self.removing
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyReport {
    pub overall: StatusCounts,
    pub by_rack: BTreeMap<String, StatusCounts>,
    pub by_tier: BTreeMap<u8, StatusCounts>,
}

/// A record joined with its slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordWithLocation {
    #[serde(flatten)]
    pub record: InventoryRecord,
    pub rack: String,
    pub tier: u8,
    pub index: u8,
    pub slot_status: SlotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    Admit,
    Restrict,
}

/// Last payload seen on a tier's system-state topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemObservation {
    pub payload: String,
    pub observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SlotEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SlotEngine {
    layout: Layout,
    topology: Topology,
    operator: String,
    slots: SlotStore,
    inventory: Inventory,
    placements: PendingPlacements,
    removals: PendingRemovals,
    dedup: DedupGuard,
    ledger: MovementLedger,
    admission: Option<AdmissionMode>,
    system_states: BTreeMap<String, SystemObservation>,
    movement_seq: u64,
}

impl SlotEngine {
    pub fn new(layout: Layout, topology: Topology) -> Result<Self, TopologyError> {
        topology.check_against(&layout)?;
        let slots = SlotStore::generate(&layout);
        Ok(Self {
            layout,
            topology,
            operator: DEFAULT_OPERATOR.to_string(),
            slots,
            inventory: Inventory::new(),
            placements: PendingPlacements::default(),
            removals: PendingRemovals::default(),
            dedup: DedupGuard::default(),
            ledger: MovementLedger::new(),
            admission: None,
            system_states: BTreeMap::new(),
            movement_seq: 0,
        })
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    // -----------------------------------------------------------------------
    // Local commands
    // -----------------------------------------------------------------------

    /// `free -> placing`, store the pending placement, publish `p<ch>c`.
    pub fn request_placement(
        &mut self,
        slot: &SlotId,
        draft: ProductDraft,
        now: DateTime<Utc>,
    ) -> Result<Outcome, CommandRejected> {
        let draft = draft
            .normalized()
            .map_err(|detail| CommandRejected::InvalidDraft { detail })?;

        let status = self
            .slots
            .status(slot)
            .ok_or_else(|| CommandRejected::UnknownSlot { slot: slot.clone() })?;
        if status != SlotStatus::Free || self.inventory.by_slot(slot).is_some() {
            return Err(CommandRejected::SlotNotFree {
                slot: slot.clone(),
                status,
            });
        }
        if self.inventory.contains_sku(&draft.sku) || self.placements.contains_sku(&draft.sku) {
            return Err(CommandRejected::DuplicateSku { sku: draft.sku });
        }
        let command = self
            .topology
            .command_for(slot, CommandKind::Place)
            .ok_or_else(|| CommandRejected::Unwired { slot: slot.clone() })?;

        let change = self
            .slots
            .transition(slot, SlotStatus::Placing, Trigger::Dispatch)
            .map_err(|e| CommandRejected::SlotNotFree {
                slot: slot.clone(),
                status: e.from,
            })?;
        self.placements.insert(PendingPlacement {
            slot_id: slot.clone(),
            draft,
            created_at: now,
        });

        Ok(Outcome {
            effects: vec![Effect::Publish { command }],
            changes: vec![change],
        })
    }

    /// `occupied -> removing`, register the pending removal, publish `q<ch>q`
    /// and delete the persisted record. The in-memory record stays until the
    /// physical `libre` arrives.
    pub fn request_removal(&mut self, sku: &str) -> Result<Outcome, CommandRejected> {
        let sku = sku.trim();
        let record = self
            .inventory
            .by_sku(sku)
            .ok_or_else(|| CommandRejected::RecordNotFound {
                key: sku.to_string(),
            })?;
        let slot = record.slot_id.clone();
        let sku = record.sku.clone();

        if self.removals.contains(&slot) {
            return Err(CommandRejected::RemovalPending { sku });
        }
        let command = self
            .topology
            .command_for(&slot, CommandKind::Remove)
            .ok_or_else(|| CommandRejected::Unwired { slot: slot.clone() })?;

        let change = self
            .slots
            .transition(&slot, SlotStatus::Removing, Trigger::Dispatch)
            .map_err(|e| CommandRejected::SlotNotFree {
                slot: slot.clone(),
                status: e.from,
            })?;
        self.removals.insert(slot);

        Ok(Outcome {
            effects: vec![Effect::Publish { command }, Effect::DeleteRecord { sku }],
            changes: vec![change],
        })
    }

    /// Local edit; no hardware round-trip. Appends one `Edición` movement.
    pub fn request_edit(
        &mut self,
        record_id: &str,
        edit: RecordEdit,
        now: DateTime<Utc>,
    ) -> Result<Outcome, CommandRejected> {
        if !self.inventory.contains_id(record_id) {
            return Err(CommandRejected::RecordNotFound {
                key: record_id.to_string(),
            });
        }
        let edit = RecordEdit {
            name: edit.name.map(|n| n.trim().to_string()),
            quantity: edit.quantity,
        };
        if edit.is_empty() {
            return Err(CommandRejected::InvalidDraft {
                detail: "edit changes nothing".to_string(),
            });
        }
        if edit.name.as_deref() == Some("") {
            return Err(CommandRejected::InvalidDraft {
                detail: "name must not be empty".to_string(),
            });
        }

        let Some((before, after)) = self.inventory.apply_edit(record_id, &edit) else {
            return Err(CommandRejected::RecordNotFound {
                key: record_id.to_string(),
            });
        };

        let mut movement = self.movement(MovementAction::Edicion, &after, now);
        if let Some(quantity) = edit.quantity {
            movement.previous_quantity = Some(before.quantity);
            movement.new_quantity = Some(quantity);
        }
        self.ledger.append(movement.clone());

        Ok(Outcome {
            effects: vec![
                Effect::UpdateRecord { record: after },
                Effect::PersistMovement { movement },
            ],
            changes: Vec::new(),
        })
    }

    /// Empty a whole rack locally. Records get an `Egreso`; in-flight
    /// placements are abandoned without a movement.
    pub fn clear_rack(&mut self, rack: &str, now: DateTime<Utc>) -> Result<Outcome, CommandRejected> {
        if !self.layout.racks.iter().any(|r| r == rack) {
            return Err(CommandRejected::UnknownRack {
                rack: rack.to_string(),
            });
        }

        let targets: Vec<(SlotId, SlotStatus)> = self
            .slots
            .in_rack(rack)
            .filter(|s| s.status != SlotStatus::Free)
            .map(|s| (s.id.clone(), s.status))
            .collect();

        let mut outcome = Outcome::default();
        for (slot, status) in targets {
            let Ok(change) = self.slots.transition(&slot, SlotStatus::Free, Trigger::Clear) else {
                continue;
            };
            outcome.changes.push(change);

            match status {
                SlotStatus::Placing => {
                    self.placements.remove(&slot);
                }
                SlotStatus::Occupied | SlotStatus::Removing => {
                    let was_pending_removal = self.removals.remove(&slot);
                    if let Some(record) = self.inventory.remove_by_slot(&slot) {
                        let movement = self.movement(MovementAction::Egreso, &record, now);
                        self.ledger.append(movement.clone());
                        if !was_pending_removal {
                            outcome.effects.push(Effect::DeleteRecord {
                                sku: record.sku.clone(),
                            });
                        }
                        outcome.effects.push(Effect::PersistMovement { movement });
                    }
                }
                SlotStatus::Free => {}
            }
            self.dedup.release(&slot);
        }
        Ok(outcome)
    }

    /// Publish the admit or restrict payload on the admission topic.
    pub fn set_admission(&mut self, admit: bool) -> Outcome {
        self.admission = Some(if admit {
            AdmissionMode::Admit
        } else {
            AdmissionMode::Restrict
        });
        Outcome {
            effects: vec![Effect::Publish {
                command: self.topology.admission_command(admit),
            }],
            changes: Vec::new(),
        }
    }

    /// Bind persisted records to their slots and load movement history.
    ///
    /// Records whose slot is unknown or not free, or whose id/sku is already
    /// in use, are skipped and reported.
    pub fn hydrate(
        &mut self,
        records: Vec<InventoryRecord>,
        history: Vec<MovementRecord>,
    ) -> HydrationReport {
        let mut report = HydrationReport::default();

        for record in records {
            let skip = |reason: String| HydrationSkip {
                record_id: record.id.clone(),
                sku: record.sku.clone(),
                slot: record.slot_id.clone(),
                reason,
            };

            match self.slots.status(&record.slot_id) {
                None => {
                    report.skipped.push(skip("slot not in layout".to_string()));
                    continue;
                }
                Some(SlotStatus::Free) => {}
                Some(other) => {
                    report.skipped.push(skip(format!("slot is {other}")));
                    continue;
                }
            }
            if self.placements.contains_sku(&record.sku) {
                report
                    .skipped
                    .push(skip(format!("sku '{}' has a pending placement", record.sku)));
                continue;
            }
            if let Err(conflict) = self.inventory.insert(record.clone()) {
                report.skipped.push(skip(conflict.to_string()));
                continue;
            }

            match self
                .slots
                .transition(&record.slot_id, SlotStatus::Occupied, Trigger::Hydrate)
            {
                Ok(change) => {
                    report.changes.push(change);
                    report.bound += 1;
                }
                Err(e) => {
                    self.inventory.remove_by_slot(&record.slot_id);
                    report.skipped.push(skip(e.to_string()));
                }
            }
        }

        report.movements_loaded = history.len();
        self.ledger.extend_history(history);
        report
    }

    // -----------------------------------------------------------------------
    // Inbound reconciliation
    // -----------------------------------------------------------------------

    /// Reconcile one inbound message. Never fails: every entry is classified.
    pub fn handle_message(&mut self, msg: &InboundMessage, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport {
            topic: msg.topic.clone(),
            observation: Observation::Unrecognized,
            entries: Vec::new(),
            outcome: Outcome::default(),
        };

        match self.topology.classify(&msg.topic) {
            TopicKind::Status { tier_id } => match parse_status_payload(&msg.payload) {
                Ok(channels) => {
                    for ch in channels {
                        let (disposition, outcome) =
                            self.reconcile_channel(&tier_id, ch.channel, &ch.estado, now);
                        report.entries.push(disposition);
                        report.outcome.merge(outcome);
                    }
                    report.observation = Observation::Status { tier_id };
                }
                Err(e) => {
                    report.observation = Observation::MalformedPayload {
                        tier_id,
                        error: e.to_string(),
                    };
                }
            },
            TopicKind::SystemState { tier_id } => {
                let payload = msg.payload_text();
                self.system_states.insert(
                    tier_id.clone(),
                    SystemObservation {
                        payload: payload.clone(),
                        observed_at: now,
                    },
                );
                report.observation = Observation::SystemState { tier_id, payload };
            }
            TopicKind::CommandEcho { tier_id } => {
                report.observation = Observation::CommandEcho {
                    tier_id,
                    payload: msg.payload_text(),
                };
            }
            TopicKind::Unrecognized => {}
        }

        report
    }

    fn reconcile_channel(
        &mut self,
        tier_id: &str,
        channel: u16,
        estado: &str,
        now: DateTime<Utc>,
    ) -> (Disposition, Outcome) {
        let unresolved = || Disposition::UnresolvedTopology {
            tier_id: tier_id.to_string(),
            channel,
        };
        let Some(slot) = self.topology.slot_for_channel(tier_id, channel) else {
            return (unresolved(), Outcome::default());
        };
        let Some(current) = self.slots.status(&slot) else {
            return (unresolved(), Outcome::default());
        };
        let Some(reported) = parse_estado(estado) else {
            return (
                Disposition::UnrecognizedStatus {
                    slot,
                    estado: estado.to_string(),
                },
                Outcome::default(),
            );
        };

        let stale = |slot: SlotId| Disposition::StaleConfirmation {
            slot,
            current,
            reported,
        };

        match (reported, current) {
            (SlotStatus::Occupied, SlotStatus::Placing)
                if !self.dedup.contains(&slot) && self.placements.contains(&slot) =>
            {
                self.commit_placement(slot, now)
            }
            (SlotStatus::Occupied, SlotStatus::Occupied) if self.dedup.contains(&slot) => {
                (Disposition::DuplicateConfirmation { slot }, Outcome::default())
            }
            (SlotStatus::Free, SlotStatus::Removing) if self.removals.contains(&slot) => {
                self.commit_removal(slot, now)
            }
            (r, c) if r == c => (Disposition::Unchanged { slot, status: c }, Outcome::default()),
            _ => (stale(slot), Outcome::default()),
        }
    }

    fn commit_placement(&mut self, slot: SlotId, now: DateTime<Utc>) -> (Disposition, Outcome) {
        let stale = |slot: SlotId| Disposition::StaleConfirmation {
            slot,
            current: SlotStatus::Placing,
            reported: SlotStatus::Occupied,
        };
        let Some(pending) = self.placements.get(&slot) else {
            return (stale(slot), Outcome::default());
        };
        let record = InventoryRecord {
            id: format!("{}-{}", pending.draft.sku, slot),
            slot_id: slot.clone(),
            sku: pending.draft.sku.clone(),
            name: pending.draft.name.clone(),
            quantity: pending.draft.quantity,
        };
        if self.inventory.insert(record.clone()).is_err() {
            return (stale(slot), Outcome::default());
        }
        let change = match self
            .slots
            .transition(&slot, SlotStatus::Occupied, Trigger::Confirm)
        {
            Ok(change) => change,
            Err(_) => {
                self.inventory.remove_by_slot(&slot);
                return (stale(slot), Outcome::default());
            }
        };

        self.dedup.mark(slot.clone());
        self.placements.remove(&slot);
        let movement = self.movement(MovementAction::Ingreso, &record, now);
        self.ledger.append(movement.clone());
        let disposition = Disposition::PlacementCommitted {
            slot,
            record_id: record.id.clone(),
            sku: record.sku.clone(),
        };

        (
            disposition,
            Outcome {
                effects: vec![
                    Effect::PersistRecord { record },
                    Effect::PersistMovement { movement },
                ],
                changes: vec![change],
            },
        )
    }

    fn commit_removal(&mut self, slot: SlotId, now: DateTime<Utc>) -> (Disposition, Outcome) {
        let change = match self.slots.transition(&slot, SlotStatus::Free, Trigger::Confirm) {
            Ok(change) => change,
            Err(e) => {
                return (
                    Disposition::StaleConfirmation {
                        slot,
                        current: e.from,
                        reported: SlotStatus::Free,
                    },
                    Outcome::default(),
                )
            }
        };

        self.removals.remove(&slot);
        let mut outcome = Outcome {
            effects: Vec::new(),
            changes: vec![change],
        };
        let removed = self.inventory.remove_by_slot(&slot);
        if let Some(record) = &removed {
            let movement = self.movement(MovementAction::Egreso, record, now);
            self.ledger.append(movement.clone());
            outcome.effects.push(Effect::PersistMovement { movement });
        }
        self.dedup.release(&slot);

        (
            Disposition::RemovalCommitted {
                slot,
                sku: removed.map(|r| r.sku),
            },
            outcome,
        )
    }

    fn movement(
        &mut self,
        action: MovementAction,
        record: &InventoryRecord,
        now: DateTime<Utc>,
    ) -> MovementRecord {
        self.movement_seq += 1;
        MovementRecord {
            id: format!("mov-{:06}", self.movement_seq),
            action,
            sku: record.sku.clone(),
            name: record.name.clone(),
            quantity: record.quantity,
            location: record.slot_id.to_string(),
            user: self.operator.clone(),
            timestamp: now,
            previous_quantity: None,
            new_quantity: None,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn slot(&self, id: &SlotId) -> Option<&Slot> {
        self.slots.get(id)
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.slots.iter().cloned().collect()
    }

    pub fn records(&self) -> Vec<InventoryRecord> {
        self.inventory.iter().cloned().collect()
    }

    pub fn record(&self, id: &str) -> Option<&InventoryRecord> {
        self.inventory.get(id)
    }

    pub fn record_by_slot(&self, slot: &SlotId) -> Option<&InventoryRecord> {
        self.inventory.by_slot(slot)
    }

    pub fn record_by_sku(&self, sku: &str) -> Option<&InventoryRecord> {
        self.inventory.by_sku(sku)
    }

    pub fn records_with_location(&self) -> Vec<RecordWithLocation> {
        self.inventory
            .iter()
            .map(|r| RecordWithLocation {
                record: r.clone(),
                rack: r.slot_id.rack.clone(),
                tier: r.slot_id.tier,
                index: r.slot_id.index,
                slot_status: self.slots.status(&r.slot_id).unwrap_or(SlotStatus::Free),
            })
            .collect()
    }

    pub fn total_products(&self) -> usize {
        self.inventory.len()
    }

    pub fn low_stock(&self, threshold: u32) -> Vec<InventoryRecord> {
        self.inventory
            .iter()
            .filter(|r| r.quantity <= threshold)
            .cloned()
            .collect()
    }

    /// Ledger, most recent first.
    pub fn movements(&self) -> Vec<MovementRecord> {
        self.ledger.list()
    }

    pub fn pending_placements(&self) -> Vec<PendingPlacement> {
        self.placements.iter().cloned().collect()
    }

    pub fn pending_removals(&self) -> Vec<SlotId> {
        self.removals.iter().cloned().collect()
    }

    pub fn dedup_slots(&self) -> Vec<SlotId> {
        self.dedup.iter().cloned().collect()
    }

    pub fn admission(&self) -> Option<AdmissionMode> {
        self.admission
    }

    pub fn system_states(&self) -> &BTreeMap<String, SystemObservation> {
        &self.system_states
    }

    pub fn occupancy(&self) -> OccupancyReport {
        let mut report = OccupancyReport::default();
        for slot in self.slots.iter() {
            report.overall.add(slot.status);
            report
                .by_rack
                .entry(slot.rack.clone())
                .or_default()
                .add(slot.status);
            report.by_tier.entry(slot.tier).or_default().add(slot.status);
        }
        report
    }

    /// Cross-check slot statuses against inventory, queues and dedup guard.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut out = Vec::new();

        for slot in self.slots.iter() {
            let id = &slot.id;
            let has_record = self.inventory.by_slot(id).is_some();
            match slot.status {
                SlotStatus::Occupied if !has_record => {
                    out.push(InvariantViolation::OccupiedWithoutRecord { slot: id.clone() })
                }
                SlotStatus::Placing => {
                    if !self.placements.contains(id) {
                        out.push(InvariantViolation::PlacingWithoutPending { slot: id.clone() });
                    }
                }
                SlotStatus::Removing => {
                    if !self.removals.contains(id) {
                        out.push(InvariantViolation::RemovingNotPending { slot: id.clone() });
                    }
                    if !has_record {
                        out.push(InvariantViolation::RemovingWithoutRecord { slot: id.clone() });
                    }
                }
                SlotStatus::Free => {
                    if self.dedup.contains(id) {
                        out.push(InvariantViolation::DedupOnFreeSlot { slot: id.clone() });
                    }
                }
                SlotStatus::Occupied => {}
            }
        }

        for record in self.inventory.iter() {
            let status = self
                .slots
                .status(&record.slot_id)
                .unwrap_or(SlotStatus::Free);
            if !matches!(status, SlotStatus::Occupied | SlotStatus::Removing) {
                out.push(InvariantViolation::RecordOnUnboundSlot {
                    slot: record.slot_id.clone(),
                    status,
                });
            }
        }

        for pending in self.placements.iter() {
            let status = self
                .slots
                .status(&pending.slot_id)
                .unwrap_or(SlotStatus::Free);
            if status != SlotStatus::Placing {
                out.push(InvariantViolation::PendingPlacementNotPlacing {
                    slot: pending.slot_id.clone(),
                    status,
                });
            }
        }

        for slot in self.removals.iter() {
            let status = self.slots.status(slot).unwrap_or(SlotStatus::Free);
            if status != SlotStatus::Removing {
                out.push(InvariantViolation::PendingRemovalNotRemoving {
                    slot: slot.clone(),
                    status,
                });
            }
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
