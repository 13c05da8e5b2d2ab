//! Slot identity, status and the slot store.
//!
//! # Transition table
//!
//! Every status change goes through [`SlotStore::transition`], which checks the
//! `(from, to, trigger)` triple against a fixed table. Anything not in the
//! table is refused with [`TransitionError`] and the slot is left untouched.
//!
//! ```text
//!            Dispatch            Confirm
//!   Free ───────────────► Placing ───────────► Occupied
//!    ▲  ▲                   │                   │   │
//!    │  │      Clear        │                   │   │ Dispatch
//!    │  └───────────────────┘                   │   ▼
//!    │                          Clear           │ Removing
//!    ├──────────────────────────────────────────┘   │
//!    │              Confirm | Clear                 │
//!    └──────────────────────────────────────────────┘
//!
//!   Free ──Hydrate──► Occupied   (start-up load of persisted records only)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::topology::Layout;

// ---------------------------------------------------------------------------
// SlotId
// ---------------------------------------------------------------------------

/// Composite slot identity `(rack, tier, index)`, rendered as `"A-1-3"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotId {
    pub rack: String,
    pub tier: u8,
    pub index: u8,
}

impl SlotId {
    pub fn new(rack: impl Into<String>, tier: u8, index: u8) -> Self {
        Self {
            rack: rack.into(),
            tier,
            index,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.rack, self.tier, self.index)
    }
}

/// Returned when a string is not a valid `rack-tier-index` slot id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotIdError(pub String);

impl fmt::Display for SlotIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid slot id '{}': expected rack-tier-index", self.0)
    }
}

impl std::error::Error for SlotIdError {}

impl FromStr for SlotId {
    type Err = SlotIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('-');
        let (Some(rack), Some(tier), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SlotIdError(s.to_string()));
        };
        if rack.is_empty() {
            return Err(SlotIdError(s.to_string()));
        }
        let tier = tier.parse::<u8>().map_err(|_| SlotIdError(s.to_string()))?;
        let index = index.parse::<u8>().map_err(|_| SlotIdError(s.to_string()))?;
        Ok(SlotId::new(rack, tier, index))
    }
}

impl TryFrom<String> for SlotId {
    type Error = SlotIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotId> for String {
    fn from(value: SlotId) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// SlotStatus
// ---------------------------------------------------------------------------

/// Status of a single slot as the engine believes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Free,
    Placing,
    Occupied,
    Removing,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Free => "free",
            SlotStatus::Placing => "placing",
            SlotStatus::Occupied => "occupied",
            SlotStatus::Removing => "removing",
        }
    }

    /// Whether the table admits `self -> to` for the given trigger.
    pub fn can_transition_to(self, to: SlotStatus, trigger: Trigger) -> bool {
        use SlotStatus::*;
        use Trigger::*;

        matches!(
            (self, to, trigger),
            (Free, Placing, Dispatch)
                | (Placing, Occupied, Confirm)
                | (Occupied, Removing, Dispatch)
                | (Removing, Free, Confirm)
                | (Placing | Occupied | Removing, Free, Clear)
                | (Free, Occupied, Hydrate)
        )
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A local command intent (optimistic, before the hardware answers).
    Dispatch,
    /// A physical confirmation received from the transport.
    Confirm,
    /// A local bulk rack clear.
    Clear,
    /// Start-up binding of a persisted record.
    Hydrate,
}

/// Returned when a transition is not in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub slot: SlotId,
    pub from: SlotStatus,
    pub to: SlotStatus,
    pub trigger: Trigger,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal slot transition on {}: {} -> {} ({:?})",
            self.slot, self.from, self.to, self.trigger
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Slot / SlotStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub rack: String,
    pub tier: u8,
    pub index: u8,
    pub status: SlotStatus,
}

/// A status change that was applied to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChange {
    pub slot: SlotId,
    pub from: SlotStatus,
    pub to: SlotStatus,
    pub trigger: Trigger,
}

/// Every slot of the layout, keyed by id. Generated once; only status mutates.
#[derive(Debug, Clone)]
pub struct SlotStore {
    slots: BTreeMap<SlotId, Slot>,
}

impl SlotStore {
    /// Generate every `(rack, tier, index)` of the layout in the `free` state.
    pub fn generate(layout: &Layout) -> Self {
        let mut slots = BTreeMap::new();
        for rack in &layout.racks {
            for tier in 1..=layout.tiers {
                for index in 1..=layout.slots_per_tier {
                    let id = SlotId::new(rack.clone(), tier, index);
                    slots.insert(
                        id.clone(),
                        Slot {
                            id,
                            rack: rack.clone(),
                            tier,
                            index,
                            status: SlotStatus::Free,
                        },
                    );
                }
            }
        }
        Self { slots }
    }

    pub fn get(&self, id: &SlotId) -> Option<&Slot> {
        self.slots.get(id)
    }

    pub fn status(&self, id: &SlotId) -> Option<SlotStatus> {
        self.slots.get(id).map(|s| s.status)
    }

    pub fn contains(&self, id: &SlotId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    pub fn in_rack<'a>(&'a self, rack: &'a str) -> impl Iterator<Item = &'a Slot> + 'a {
        self.slots.values().filter(move |s| s.rack == rack)
    }

    /// Apply `to` if the table admits it. On error the slot is unchanged.
    ///
    /// Unknown slot ids are refused with `from` reported as `free`.
    pub fn transition(
        &mut self,
        id: &SlotId,
        to: SlotStatus,
        trigger: Trigger,
    ) -> Result<SlotChange, TransitionError> {
        let Some(slot) = self.slots.get_mut(id) else {
            return Err(TransitionError {
                slot: id.clone(),
                from: SlotStatus::Free,
                to,
                trigger,
            });
        };
        let from = slot.status;
        if !from.can_transition_to(to, trigger) {
            return Err(TransitionError {
                slot: id.clone(),
                from,
                to,
                trigger,
            });
        }
        slot.status = to;
        Ok(SlotChange {
            slot: id.clone(),
            from,
            to,
            trigger,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn small_layout() -> Layout {
        Layout {
            racks: vec!["A".to_string(), "B".to_string()],
            tiers: 2,
            slots_per_tier: 3,
        }
    }

    #[test]
    fn slot_id_round_trips_through_display() {
        let id: SlotId = "A-1-3".parse().unwrap();
        assert_eq!(id, SlotId::new("A", 1, 3));
        assert_eq!(id.to_string(), "A-1-3");
    }

    #[test]
    fn slot_id_rejects_malformed_strings() {
        assert!("A-1".parse::<SlotId>().is_err());
        assert!("A-1-2-3".parse::<SlotId>().is_err());
        assert!("-1-2".parse::<SlotId>().is_err());
        assert!("A-x-2".parse::<SlotId>().is_err());
    }

    #[test]
    fn slot_id_serializes_as_string() {
        let json = serde_json::to_string(&SlotId::new("C", 2, 5)).unwrap();
        assert_eq!(json, "\"C-2-5\"");
        let back: SlotId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SlotId::new("C", 2, 5));
    }

    #[test]
    fn generate_creates_one_free_slot_per_key() {
        let store = SlotStore::generate(&small_layout());
        assert_eq!(store.len(), 2 * 2 * 3);
        assert!(store.iter().all(|s| s.status == SlotStatus::Free));
        assert_eq!(store.in_rack("B").count(), 6);
    }

    #[test]
    fn placement_cycle_follows_the_table() {
        let mut store = SlotStore::generate(&small_layout());
        let id = SlotId::new("A", 1, 1);
        store
            .transition(&id, SlotStatus::Placing, Trigger::Dispatch)
            .unwrap();
        store
            .transition(&id, SlotStatus::Occupied, Trigger::Confirm)
            .unwrap();
        store
            .transition(&id, SlotStatus::Removing, Trigger::Dispatch)
            .unwrap();
        let change = store
            .transition(&id, SlotStatus::Free, Trigger::Confirm)
            .unwrap();
        assert_eq!(change.from, SlotStatus::Removing);
        assert_eq!(store.status(&id), Some(SlotStatus::Free));
    }

    #[test]
    fn confirmation_cannot_jump_free_to_occupied() {
        let mut store = SlotStore::generate(&small_layout());
        let id = SlotId::new("A", 1, 1);
        let err = store
            .transition(&id, SlotStatus::Occupied, Trigger::Confirm)
            .unwrap_err();
        assert_eq!(err.from, SlotStatus::Free);
        assert_eq!(store.status(&id), Some(SlotStatus::Free));
    }

    #[test]
    fn occupied_slot_is_only_freed_by_clear() {
        let mut store = SlotStore::generate(&small_layout());
        let id = SlotId::new("A", 2, 2);
        store
            .transition(&id, SlotStatus::Occupied, Trigger::Hydrate)
            .unwrap();
        assert!(store
            .transition(&id, SlotStatus::Free, Trigger::Confirm)
            .is_err());
        store
            .transition(&id, SlotStatus::Free, Trigger::Clear)
            .unwrap();
    }

    #[test]
    fn unknown_slot_is_refused() {
        let mut store = SlotStore::generate(&small_layout());
        let id = SlotId::new("Z", 9, 9);
        assert!(store
            .transition(&id, SlotStatus::Placing, Trigger::Dispatch)
            .is_err());
    }
}
