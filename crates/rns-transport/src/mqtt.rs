//! Native MQTT transport.
//!
//! Publishes through an `rumqttc` client and subscribes to the station's
//! topics itself, so no bridge webhook is needed. The client half
//! ([`MqttTransport`]) implements [`Transport`]; the event-loop half
//! ([`MqttInbound`]) must be driven by [`MqttInbound::run`] for anything to
//! reach the broker in either direction.
//!
//! Subscriptions are (re)issued on every `ConnAck`, so a broker restart does
//! not leave the station deaf.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS, SubscribeFilter};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use rns_core::{InboundMessage, OutboundCommand};

use crate::{BridgeCredentials, Transport, TransportError};

/// Pause after a connection error before polling again.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Requests the client may queue before the event loop picks them up.
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub qos: u8,
    pub credentials: Option<BridgeCredentials>,
}

pub fn qos_level(qos: u8) -> Result<QoS, TransportError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransportError::Config(format!("mqtt qos {other} is not 0, 1 or 2"))),
    }
}

/// Build the client pair. No IO happens until [`MqttInbound::run`] polls.
pub fn connect(
    settings: &MqttSettings,
    subscriptions: Vec<String>,
) -> Result<(MqttTransport, MqttInbound), TransportError> {
    let qos = qos_level(settings.qos)?;
    let mut options = MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
    options.set_keep_alive(settings.keep_alive);
    if let Some(c) = &settings.credentials {
        options.set_credentials(c.username.clone(), c.password.clone());
    }
    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    Ok((
        MqttTransport {
            client: client.clone(),
            qos,
        },
        MqttInbound {
            client,
            eventloop,
            subscriptions,
            qos,
        },
    ))
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    qos: QoS,
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn publish(&self, command: &OutboundCommand) -> Result<(), TransportError> {
        self.client
            .publish(
                command.topic.clone(),
                self.qos,
                false,
                command.payload.clone().into_bytes(),
            )
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

pub struct MqttInbound {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<String>,
    qos: QoS,
}

impl MqttInbound {
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Drive the connection and forward every received publish to `tx`.
    /// Returns once the receiver is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<InboundMessage>) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(topics = self.subscriptions.len(), "mqtt connected; subscribing");
                    let filters = subscribe_filters(&self.subscriptions, self.qos);
                    if let Err(e) = self.client.try_subscribe_many(filters) {
                        warn!(error = %e, "mqtt subscribe request failed");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "mqtt message");
                    if tx.send(inbound_message(&publish)).await.is_err() {
                        info!("inbound receiver closed; mqtt loop stopping");
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "mqtt connection error; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

pub fn subscribe_filters(topics: &[String], qos: QoS) -> Vec<SubscribeFilter> {
    topics
        .iter()
        .map(|t| SubscribeFilter::new(t.clone(), qos))
        .collect()
}

pub fn inbound_message(publish: &Publish) -> InboundMessage {
    InboundMessage::new(publish.topic.clone(), publish.payload.to_vec())
}
