//! Append-only movement ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementAction {
    Ingreso,
    Egreso,
    #[serde(rename = "Edición")]
    Edicion,
}

impl MovementAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementAction::Ingreso => "Ingreso",
            MovementAction::Egreso => "Egreso",
            MovementAction::Edicion => "Edición",
        }
    }

    /// Accepts the canonical labels and the unaccented `Edicion`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Ingreso" => Some(MovementAction::Ingreso),
            "Egreso" => Some(MovementAction::Egreso),
            "Edición" | "Edicion" => Some(MovementAction::Edicion),
            _ => None,
        }
    }
}

impl fmt::Display for MovementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// Engine-assigned for new entries; the gateway id for loaded history.
    pub id: String,
    pub action: MovementAction,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    /// Slot id rendered as `rack-tier-index`.
    pub location: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_quantity: Option<u32>,
}

/// Movements in append order. `append` is the only mutator for new entries;
/// `extend_history` loads previously persisted ones at start-up.
#[derive(Debug, Clone, Default)]
pub struct MovementLedger {
    entries: Vec<MovementRecord>,
}

impl MovementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: MovementRecord) {
        self.entries.push(record);
    }

    pub fn extend_history(&mut self, history: impl IntoIterator<Item = MovementRecord>) {
        let mut history: Vec<MovementRecord> = history.into_iter().collect();
        history.append(&mut self.entries);
        self.entries = history;
    }

    /// Most recent first. Equal timestamps list the later append first.
    pub fn list(&self) -> Vec<MovementRecord> {
        let mut indexed: Vec<(usize, &MovementRecord)> = self.entries.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        indexed.into_iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MovementRecord> {
        self.entries.iter()
    }
}
