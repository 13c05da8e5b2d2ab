//! Request and response types for all rns-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};

use rns_core::{
    Disposition, InventoryRecord, MovementRecord, Observation, Outcome,
    OutboundCommand, PendingPlacement, ProductDraft, RecordWithLocation, Slot, SlotChange, SlotId,
};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Refusals
// ---------------------------------------------------------------------------

/// Body of every 4xx/5xx answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable code, e.g. "slot_not_free".
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub slot: SlotId,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
}

impl PlacementRequest {
    pub fn draft(&self) -> ProductDraft {
        ProductDraft::new(self.sku.clone(), self.name.clone(), self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalRequest {
    pub sku: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub admit: bool,
}

/// What an accepted command did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAccepted {
    pub changes: Vec<SlotChange>,
    pub published: Vec<OutboundCommand>,
    pub movements: Vec<MovementRecord>,
}

impl From<Outcome> for CommandAccepted {
    fn from(outcome: Outcome) -> Self {
        Self {
            published: outcome.publishes().cloned().collect(),
            movements: outcome.movements().cloned().collect(),
            changes: outcome.changes,
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/hardware/events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareEventResponse {
    pub topic: String,
    pub observation: Observation,
    pub entries: Vec<Disposition>,
    pub changes: Vec<SlotChange>,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsResponse {
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDetailResponse {
    pub slot: Slot,
    pub record: Option<InventoryRecord>,
    pub pending_placement: Option<PendingPlacement>,
    pub pending_removal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub total: usize,
    pub products: Vec<RecordWithLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockResponse {
    pub threshold: u32,
    pub products: Vec<InventoryRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementsResponse {
    pub movements: Vec<MovementRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingResponse {
    pub placements: Vec<PendingPlacement>,
    pub removals: Vec<SlotId>,
}
