//! Committed inventory records, indexed by id, slot and sku.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::slot::SlotId;

/// What the operator proposes to store. Becomes a record on physical commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
}

impl ProductDraft {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, quantity: u32) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            quantity,
        }
    }

    /// Trimmed copy, or a reason the draft cannot be used.
    pub fn normalized(&self) -> Result<ProductDraft, String> {
        let sku = self.sku.trim();
        let name = self.name.trim();
        if sku.is_empty() {
            return Err("sku must not be empty".to_string());
        }
        if name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(ProductDraft::new(sku, name, self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: String,
    pub slot_id: SlotId,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
}

/// Local edit of a record. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl RecordEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none()
    }
}

/// Why a record could not be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertConflict {
    IdTaken(String),
    SlotBound(SlotId),
    SkuTaken(String),
}

impl fmt::Display for InsertConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertConflict::IdTaken(id) => write!(f, "record id '{id}' already in use"),
            InsertConflict::SlotBound(slot) => write!(f, "slot {slot} already holds a record"),
            InsertConflict::SkuTaken(sku) => write!(f, "sku '{sku}' already in use"),
        }
    }
}

/// All committed records. At most one per slot, sku unique.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    by_id: BTreeMap<String, InventoryRecord>,
    slot_index: BTreeMap<SlotId, String>,
    sku_index: BTreeMap<String, String>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// What would stop `record` from being inserted, if anything.
    pub fn conflict(&self, record: &InventoryRecord) -> Option<InsertConflict> {
        if self.by_id.contains_key(&record.id) {
            return Some(InsertConflict::IdTaken(record.id.clone()));
        }
        if self.slot_index.contains_key(&record.slot_id) {
            return Some(InsertConflict::SlotBound(record.slot_id.clone()));
        }
        if self.sku_index.contains_key(&record.sku) {
            return Some(InsertConflict::SkuTaken(record.sku.clone()));
        }
        None
    }

    pub fn insert(&mut self, record: InventoryRecord) -> Result<(), InsertConflict> {
        if let Some(conflict) = self.conflict(&record) {
            return Err(conflict);
        }
        self.slot_index
            .insert(record.slot_id.clone(), record.id.clone());
        self.sku_index.insert(record.sku.clone(), record.id.clone());
        self.by_id.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn remove_by_slot(&mut self, slot: &SlotId) -> Option<InventoryRecord> {
        let id = self.slot_index.remove(slot)?;
        let record = self.by_id.remove(&id)?;
        self.sku_index.remove(&record.sku);
        Some(record)
    }

    pub fn get(&self, id: &str) -> Option<&InventoryRecord> {
        self.by_id.get(id)
    }

    pub fn by_slot(&self, slot: &SlotId) -> Option<&InventoryRecord> {
        self.slot_index.get(slot).and_then(|id| self.by_id.get(id))
    }

    pub fn by_sku(&self, sku: &str) -> Option<&InventoryRecord> {
        self.sku_index.get(sku).and_then(|id| self.by_id.get(id))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn contains_sku(&self, sku: &str) -> bool {
        self.sku_index.contains_key(sku)
    }

    /// Apply `edit` and return `(before, after)`.
    pub fn apply_edit(
        &mut self,
        id: &str,
        edit: &RecordEdit,
    ) -> Option<(InventoryRecord, InventoryRecord)> {
        let record = self.by_id.get_mut(id)?;
        let before = record.clone();
        if let Some(name) = &edit.name {
            record.name = name.clone();
        }
        if let Some(quantity) = edit.quantity {
            record.quantity = quantity;
        }
        Some((before, record.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryRecord> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, slot: &str, sku: &str) -> InventoryRecord {
        InventoryRecord {
            id: id.to_string(),
            slot_id: slot.parse().unwrap(),
            sku: sku.to_string(),
            name: "Widget".to_string(),
            quantity: 5,
        }
    }

    #[test]
    fn indexes_follow_insert_and_remove() {
        let mut inv = Inventory::new();
        inv.insert(record("1", "A-1-1", "SKU-1")).unwrap();
        assert_eq!(inv.by_sku("SKU-1").unwrap().id, "1");
        assert!(inv.by_slot(&SlotId::new("A", 1, 1)).is_some());

        let removed = inv.remove_by_slot(&SlotId::new("A", 1, 1)).unwrap();
        assert_eq!(removed.sku, "SKU-1");
        assert!(!inv.contains_sku("SKU-1"));
        assert!(inv.is_empty());
    }

    #[test]
    fn conflicting_inserts_are_refused() {
        let mut inv = Inventory::new();
        inv.insert(record("1", "A-1-1", "SKU-1")).unwrap();
        assert_eq!(
            inv.insert(record("2", "A-1-1", "SKU-2")),
            Err(InsertConflict::SlotBound(SlotId::new("A", 1, 1)))
        );
        assert_eq!(
            inv.insert(record("2", "A-1-2", "SKU-1")),
            Err(InsertConflict::SkuTaken("SKU-1".to_string()))
        );
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn edit_returns_before_and_after() {
        let mut inv = Inventory::new();
        inv.insert(record("1", "A-1-1", "SKU-1")).unwrap();
        let (before, after) = inv
            .apply_edit(
                "1",
                &RecordEdit {
                    name: None,
                    quantity: Some(42),
                },
            )
            .unwrap();
        assert_eq!(before.quantity, 5);
        assert_eq!(after.quantity, 42);
        assert_eq!(after.name, "Widget");
        assert!(inv.apply_edit("nope", &RecordEdit::default()).is_none());
    }

    #[test]
    fn draft_is_trimmed_and_validated() {
        let d = ProductDraft::new("  SKU-9 ", " Bolt ", 3).normalized().unwrap();
        assert_eq!(d.sku, "SKU-9");
        assert_eq!(d.name, "Bolt");
        assert!(ProductDraft::new(" ", "Bolt", 1).normalized().is_err());
    }
}
