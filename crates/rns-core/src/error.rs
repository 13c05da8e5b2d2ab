//! Typed dispatcher rejections and invariant violations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::slot::{SlotId, SlotStatus};

/// Why a local command was refused. A rejected command has no side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CommandRejected {
    SlotNotFree { slot: SlotId, status: SlotStatus },
    DuplicateSku { sku: String },
    RecordNotFound { key: String },
    UnknownSlot { slot: SlotId },
    UnknownRack { rack: String },
    /// The slot exists but no controller channel drives it.
    Unwired { slot: SlotId },
    RemovalPending { sku: String },
    InvalidDraft { detail: String },
}

impl CommandRejected {
    pub fn reason_code(&self) -> &'static str {
        match self {
            CommandRejected::SlotNotFree { .. } => "slot_not_free",
            CommandRejected::DuplicateSku { .. } => "duplicate_sku",
            CommandRejected::RecordNotFound { .. } => "record_not_found",
            CommandRejected::UnknownSlot { .. } => "unknown_slot",
            CommandRejected::UnknownRack { .. } => "unknown_rack",
            CommandRejected::Unwired { .. } => "unwired",
            CommandRejected::RemovalPending { .. } => "removal_pending",
            CommandRejected::InvalidDraft { .. } => "invalid_draft",
        }
    }
}

impl fmt::Display for CommandRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandRejected::SlotNotFree { slot, status } => {
                write!(f, "slot {slot} is not free (status={status})")
            }
            CommandRejected::DuplicateSku { sku } => write!(f, "sku '{sku}' already exists"),
            CommandRejected::RecordNotFound { key } => write!(f, "no record for '{key}'"),
            CommandRejected::UnknownSlot { slot } => write!(f, "slot {slot} is not in the layout"),
            CommandRejected::UnknownRack { rack } => write!(f, "rack '{rack}' is not in the layout"),
            CommandRejected::Unwired { slot } => write!(f, "slot {slot} has no wired channel"),
            CommandRejected::RemovalPending { sku } => {
                write!(f, "removal of '{sku}' is already pending")
            }
            CommandRejected::InvalidDraft { detail } => write!(f, "invalid request: {detail}"),
        }
    }
}

impl std::error::Error for CommandRejected {}

/// A cross-structure consistency rule that does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    OccupiedWithoutRecord { slot: SlotId },
    RecordOnUnboundSlot { slot: SlotId, status: SlotStatus },
    PlacingWithoutPending { slot: SlotId },
    PendingPlacementNotPlacing { slot: SlotId, status: SlotStatus },
    RemovingNotPending { slot: SlotId },
    RemovingWithoutRecord { slot: SlotId },
    PendingRemovalNotRemoving { slot: SlotId, status: SlotStatus },
    DedupOnFreeSlot { slot: SlotId },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::OccupiedWithoutRecord { slot } => {
                write!(f, "slot {slot} is occupied but has no record")
            }
            InvariantViolation::RecordOnUnboundSlot { slot, status } => {
                write!(f, "slot {slot} holds a record while {status}")
            }
            InvariantViolation::PlacingWithoutPending { slot } => {
                write!(f, "slot {slot} is placing without a pending placement")
            }
            InvariantViolation::PendingPlacementNotPlacing { slot, status } => {
                write!(f, "pending placement on slot {slot} which is {status}")
            }
            InvariantViolation::RemovingNotPending { slot } => {
                write!(f, "slot {slot} is removing but not in pending removals")
            }
            InvariantViolation::RemovingWithoutRecord { slot } => {
                write!(f, "slot {slot} is removing without a record")
            }
            InvariantViolation::PendingRemovalNotRemoving { slot, status } => {
                write!(f, "pending removal on slot {slot} which is {status}")
            }
            InvariantViolation::DedupOnFreeSlot { slot } => {
                write!(f, "dedup guard holds free slot {slot}")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}
