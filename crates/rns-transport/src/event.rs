//! Inbound webhook delivery from the broker bridge.
//!
//! The bridge forwards every message on a subscribed topic as
//! `{ "topic": ..., "payload": ... }`. Depending on the bridge rule the
//! payload arrives either as the raw text or already decoded as JSON; both
//! end up as the same bytes in an [`InboundMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rns_core::InboundMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

impl BridgeEvent {
    pub fn into_message(self) -> InboundMessage {
        let bytes = match self.payload {
            Value::String(s) => s.into_bytes(),
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        };
        InboundMessage::new(self.topic, bytes)
    }
}
