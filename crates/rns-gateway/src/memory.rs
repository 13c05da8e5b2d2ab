//! In-memory gateway for tests and offline replay.
//!
//! Keeps products and movements in vectors. `fail_next(n)` makes the next `n`
//! write calls fail with a transport error, which is how outbox retry is
//! exercised without a network.

use async_trait::async_trait;
use tokio::sync::Mutex;

use rns_core::{InventoryRecord, MovementRecord};

use crate::{GatewayError, PersistenceGateway};

#[derive(Debug, Default)]
struct MemoryState {
    products: Vec<InventoryRecord>,
    movements: Vec<MovementRecord>,
    failures_left: u32,
    write_calls: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<MemoryState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with persisted rows, as a backend would return them at boot.
    pub fn seeded(products: Vec<InventoryRecord>, movements: Vec<MovementRecord>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                products,
                movements,
                ..MemoryState::default()
            }),
        }
    }

    pub async fn fail_next(&self, n: u32) {
        self.state.lock().await.failures_left = n;
    }

    pub async fn products(&self) -> Vec<InventoryRecord> {
        self.state.lock().await.products.clone()
    }

    pub async fn movements(&self) -> Vec<MovementRecord> {
        self.state.lock().await.movements.clone()
    }

    /// Write calls seen, failed ones included.
    pub async fn write_calls(&self) -> u64 {
        self.state.lock().await.write_calls
    }
}

impl MemoryState {
    fn begin_write(&mut self) -> Result<(), GatewayError> {
        self.write_calls += 1;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(GatewayError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_products(&self) -> Result<Vec<InventoryRecord>, GatewayError> {
        Ok(self.products().await)
    }

    async fn create_product(&self, record: &InventoryRecord) -> Result<(), GatewayError> {
        let mut st = self.state.lock().await;
        st.begin_write()?;
        st.products.retain(|p| p.id != record.id);
        st.products.push(record.clone());
        Ok(())
    }

    async fn update_product(&self, record: &InventoryRecord) -> Result<(), GatewayError> {
        let mut st = self.state.lock().await;
        st.begin_write()?;
        match st.products.iter_mut().find(|p| p.id == record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(GatewayError::Status {
                code: 404,
                body: format!("product {} not found", record.id),
            }),
        }
    }

    async fn delete_product_by_sku(&self, sku: &str) -> Result<(), GatewayError> {
        let mut st = self.state.lock().await;
        st.begin_write()?;
        st.products.retain(|p| p.sku != sku);
        Ok(())
    }

    async fn list_movements(&self) -> Result<Vec<MovementRecord>, GatewayError> {
        Ok(self.movements().await)
    }

    async fn append_movement(&self, movement: &MovementRecord) -> Result<(), GatewayError> {
        let mut st = self.state.lock().await;
        st.begin_write()?;
        st.movements.push(movement.clone());
        Ok(())
    }
}
