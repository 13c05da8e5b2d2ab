//! rns-gateway
//!
//! Persistence boundary: the durable store for committed records and movements
//! is an external request/response service. This crate owns the gateway trait,
//! the HTTP implementation, an in-memory implementation for tests and offline
//! tools, and the retry outbox for writes that failed.
//!
//! In-memory engine state is never rolled back because a write failed.

use std::fmt;

use async_trait::async_trait;

use rns_core::{Effect, InventoryRecord, MovementRecord};

pub mod http;
pub mod memory;
pub mod outbox;
pub mod wire;

pub use http::{BackendIdMap, HttpPersistenceGateway};
pub use memory::InMemoryGateway;
pub use outbox::{
    drain_due, DrainReport, DropReason, OutboxEntry, PersistenceWriteFailure, RetryOutbox,
    RetryPolicy, PARKED,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure or timeout.
    Transport(String),
    /// The backend answered with a non-success status.
    Status { code: u16, body: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The client could not be built from its settings.
    Config(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transport(msg) => write!(f, "transport error: {msg}"),
            GatewayError::Status { code, body } => {
                write!(f, "persistence backend status={code}: {body}")
            }
            GatewayError::Decode(msg) => write!(f, "decode error: {msg}"),
            GatewayError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Durable store contract. Implementations must be `Send + Sync` so the
/// daemon can share one behind an `Arc<dyn PersistenceGateway>`.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_products(&self) -> Result<Vec<InventoryRecord>, GatewayError>;

    async fn create_product(&self, record: &InventoryRecord) -> Result<(), GatewayError>;

    async fn update_product(&self, record: &InventoryRecord) -> Result<(), GatewayError>;

    async fn delete_product_by_sku(&self, sku: &str) -> Result<(), GatewayError>;

    /// Persisted history in backend order.
    async fn list_movements(&self) -> Result<Vec<MovementRecord>, GatewayError>;

    async fn append_movement(&self, movement: &MovementRecord) -> Result<(), GatewayError>;
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// One write the engine asked for. Retried as a unit by the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceWrite {
    CreateProduct(InventoryRecord),
    UpdateProduct(InventoryRecord),
    DeleteProduct { sku: String },
    AppendMovement(MovementRecord),
}

impl PersistenceWrite {
    /// The persistence half of an engine effect; publishes map to `None`.
    pub fn from_effect(effect: &Effect) -> Option<Self> {
        match effect {
            Effect::PersistRecord { record } => Some(PersistenceWrite::CreateProduct(record.clone())),
            Effect::UpdateRecord { record } => Some(PersistenceWrite::UpdateProduct(record.clone())),
            Effect::DeleteRecord { sku } => Some(PersistenceWrite::DeleteProduct { sku: sku.clone() }),
            Effect::PersistMovement { movement } => {
                Some(PersistenceWrite::AppendMovement(movement.clone()))
            }
            Effect::Publish { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceWrite::CreateProduct(_) => "create_product",
            PersistenceWrite::UpdateProduct(_) => "update_product",
            PersistenceWrite::DeleteProduct { .. } => "delete_product",
            PersistenceWrite::AppendMovement(_) => "append_movement",
        }
    }

    /// Sku the write concerns. Writes sharing a sku are applied in order.
    pub fn sku(&self) -> &str {
        match self {
            PersistenceWrite::CreateProduct(r) | PersistenceWrite::UpdateProduct(r) => &r.sku,
            PersistenceWrite::DeleteProduct { sku } => sku,
            PersistenceWrite::AppendMovement(m) => &m.sku,
        }
    }

    pub async fn apply(&self, gateway: &dyn PersistenceGateway) -> Result<(), GatewayError> {
        match self {
            PersistenceWrite::CreateProduct(r) => gateway.create_product(r).await,
            PersistenceWrite::UpdateProduct(r) => gateway.update_product(r).await,
            PersistenceWrite::DeleteProduct { sku } => gateway.delete_product_by_sku(sku).await,
            PersistenceWrite::AppendMovement(m) => gateway.append_movement(m).await,
        }
    }
}
