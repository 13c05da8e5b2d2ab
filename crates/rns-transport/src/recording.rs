//! Deterministic in-memory transport. Records every publish in order.

use async_trait::async_trait;
use tokio::sync::Mutex;

use rns_core::OutboundCommand;

use crate::{Transport, TransportError};

#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundCommand>>,
    offline: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every publish fails with `Unreachable`.
    pub async fn set_offline(&self, offline: bool) {
        *self.offline.lock().await = offline;
    }

    pub async fn sent(&self) -> Vec<OutboundCommand> {
        self.sent.lock().await.clone()
    }

    pub async fn take_sent(&self) -> Vec<OutboundCommand> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, command: &OutboundCommand) -> Result<(), TransportError> {
        if *self.offline.lock().await {
            return Err(TransportError::Unreachable("recording transport offline".to_string()));
        }
        self.sent.lock().await.push(command.clone());
        Ok(())
    }
}
