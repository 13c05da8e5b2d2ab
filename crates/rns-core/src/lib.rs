//! rns-core
//!
//! Slot reconciliation for a hardware-confirmed rack inventory.
//!
//! Deterministic, pure logic. No IO, no clock, no randomness: callers pass
//! `now` and carry out the returned effects.

pub mod engine;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod pending;
pub mod slot;
pub mod topology;
pub mod wire;

pub use engine::{
    AdmissionMode, Disposition, Effect, HydrationReport, HydrationSkip, Observation,
    OccupancyReport, Outcome, ReconcileReport, RecordWithLocation, SlotEngine, StatusCounts,
    SystemObservation, DEFAULT_LOW_STOCK_THRESHOLD, DEFAULT_OPERATOR,
};
pub use error::{CommandRejected, InvariantViolation};
pub use inventory::{Inventory, InventoryRecord, ProductDraft, RecordEdit};
pub use ledger::{MovementAction, MovementLedger, MovementRecord};
pub use pending::{DedupGuard, PendingPlacement, PendingPlacements, PendingRemovals};
pub use slot::{Slot, SlotChange, SlotId, SlotIdError, SlotStatus, SlotStore, TransitionError, Trigger};
pub use topology::{
    Admission, CommandKind, Layout, OutboundCommand, TierBinding, TopicKind, TopicScheme, Topology,
    TopologyError,
};
pub use wire::{encode_command, parse_estado, parse_status_payload, ChannelReport, InboundMessage, PayloadError};
