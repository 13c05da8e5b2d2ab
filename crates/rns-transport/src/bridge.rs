//! HTTP bridge publisher.
//!
//! ```text
//! POST {publish_url}
//! { "topic": "Entrada/L3", "payload": "p14c", "qos": 0, "retain": false }
//! ```
//!
//! Any 2xx counts as accepted. A 202 means the broker had no subscriber for
//! the topic; that is logged but not an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use rns_core::OutboundCommand;

use crate::{Transport, TransportError};

/// Basic-auth pair for the bridge. **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct BridgeCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BridgeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeCredentials")
            .field("username", &"<REDACTED>")
            .field("password", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct PublishBody<'a> {
    topic: &'a str,
    payload: &'a str,
    qos: u8,
    retain: bool,
}

#[derive(Debug, Clone)]
pub struct HttpBridgeTransport {
    http: reqwest::Client,
    publish_url: String,
    qos: u8,
    credentials: Option<BridgeCredentials>,
}

impl HttpBridgeTransport {
    pub fn new(
        publish_url: String,
        qos: u8,
        timeout: Duration,
        credentials: Option<BridgeCredentials>,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        Ok(Self {
            http,
            publish_url,
            qos,
            credentials,
        })
    }

    pub fn publish_url(&self) -> &str {
        &self.publish_url
    }
}

#[async_trait]
impl Transport for HttpBridgeTransport {
    fn name(&self) -> &'static str {
        "http-bridge"
    }

    async fn publish(&self, command: &OutboundCommand) -> Result<(), TransportError> {
        let body = PublishBody {
            topic: &command.topic,
            payload: &command.payload,
            qos: self.qos,
            retain: false,
        };
        let mut req = self.http.post(&self.publish_url).json(&body);
        if let Some(c) = &self.credentials {
            req = req.basic_auth(&c.username, Some(&c.password));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                code: status.as_u16(),
                body,
            });
        }
        if status == reqwest::StatusCode::ACCEPTED {
            debug!(topic = %command.topic, "publish accepted without subscribers");
        }
        Ok(())
    }
}
