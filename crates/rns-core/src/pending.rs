//! Pending placement / removal queues and the placement dedup guard.
//!
//! Placements and removals live in separate structures keyed by slot id, so a
//! slot can never be waiting on both at once as long as the slot status table
//! is respected (`placing` vs `removing`).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inventory::ProductDraft;
use crate::slot::SlotId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPlacement {
    pub slot_id: SlotId,
    pub draft: ProductDraft,
    pub created_at: DateTime<Utc>,
}

/// At most one pending placement per slot.
#[derive(Debug, Clone, Default)]
pub struct PendingPlacements {
    by_slot: BTreeMap<SlotId, PendingPlacement>,
}

impl PendingPlacements {
    /// Returns `false` (and keeps the existing entry) if the slot already has one.
    pub fn insert(&mut self, placement: PendingPlacement) -> bool {
        if self.by_slot.contains_key(&placement.slot_id) {
            return false;
        }
        self.by_slot.insert(placement.slot_id.clone(), placement);
        true
    }

    pub fn remove(&mut self, slot: &SlotId) -> Option<PendingPlacement> {
        self.by_slot.remove(slot)
    }

    pub fn get(&self, slot: &SlotId) -> Option<&PendingPlacement> {
        self.by_slot.get(slot)
    }

    pub fn contains(&self, slot: &SlotId) -> bool {
        self.by_slot.contains_key(slot)
    }

    pub fn contains_sku(&self, sku: &str) -> bool {
        self.by_slot.values().any(|p| p.draft.sku == sku)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingPlacement> {
        self.by_slot.values()
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }
}

/// Slot ids awaiting a physical `libre`.
#[derive(Debug, Clone, Default)]
pub struct PendingRemovals {
    slots: BTreeSet<SlotId>,
}

impl PendingRemovals {
    pub fn insert(&mut self, slot: SlotId) -> bool {
        self.slots.insert(slot)
    }

    pub fn remove(&mut self, slot: &SlotId) -> bool {
        self.slots.remove(slot)
    }

    pub fn contains(&self, slot: &SlotId) -> bool {
        self.slots.contains(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotId> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Slots that already had a placement committed in the current cycle.
/// Entries are dropped when the slot returns to `free`.
#[derive(Debug, Clone, Default)]
pub struct DedupGuard {
    slots: BTreeSet<SlotId>,
}

impl DedupGuard {
    pub fn mark(&mut self, slot: SlotId) -> bool {
        self.slots.insert(slot)
    }

    pub fn release(&mut self, slot: &SlotId) -> bool {
        self.slots.remove(slot)
    }

    pub fn contains(&self, slot: &SlotId) -> bool {
        self.slots.contains(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotId> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
