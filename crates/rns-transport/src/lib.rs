//! rns-transport
//!
//! Outbound side of the broker link. The engine never talks to the broker
//! directly: it returns `Effect::Publish` values and the daemon hands each
//! command to a [`Transport`].
//!
//! The stock deployment reaches the broker through its HTTP bridge: publishes
//! go out as `POST {publish_url}` and subscribed topics come back in as
//! webhook deliveries decoded by [`BridgeEvent`]. Stations with direct broker
//! access use [`MqttTransport`], which also subscribes itself.

use std::fmt;

use async_trait::async_trait;

use rns_core::OutboundCommand;

pub mod bridge;
pub mod event;
pub mod mqtt;
pub mod recording;

pub use bridge::{BridgeCredentials, HttpBridgeTransport};
pub use event::BridgeEvent;
pub use mqtt::{MqttInbound, MqttSettings, MqttTransport};
pub use recording::RecordingTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker unreachable or the request timed out.
    Unreachable(String),
    /// The bridge refused the publish.
    Rejected { code: u16, body: String },
    /// The client could not be built from its settings.
    Config(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unreachable(msg) => write!(f, "broker unreachable: {msg}"),
            TransportError::Rejected { code, body } => {
                write!(f, "broker rejected publish status={code}: {body}")
            }
            TransportError::Config(msg) => write!(f, "transport config error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Fire-and-forget publisher. Delivery to the hardware is confirmed only by
/// a later status message, never by the publish call itself.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, command: &OutboundCommand) -> Result<(), TransportError>;
}
