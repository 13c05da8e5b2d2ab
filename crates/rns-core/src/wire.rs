//! Transport wire codec: inbound status payloads and outbound actuator commands.
//!
//! Inbound status payload (JSON object keyed by `p<channel>`):
//!
//! ```text
//! { "p14": { "estado": "ocupado" }, "p12": { "estado": "libre" } }
//! ```
//!
//! Outbound payloads are plain text: `p<channel>c` places, `q<channel>q` removes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::slot::SlotStatus;
use crate::topology::CommandKind;

/// One message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, lossy. Used for observed-only topics and logging.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// One `p<channel>` entry of a status payload, `estado` kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub channel: u16,
    pub estado: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    NotJson(String),
    NotAnObject,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::NotJson(e) => write!(f, "status payload is not JSON: {e}"),
            PayloadError::NotAnObject => write!(f, "status payload is not a JSON object"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Decode a status payload into channel reports, ordered by key.
///
/// Keys that are not `p<digits>` and entries without a string `estado` are
/// skipped.
pub fn parse_status_payload(bytes: &[u8]) -> Result<Vec<ChannelReport>, PayloadError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| PayloadError::NotJson(e.to_string()))?;
    let obj = value.as_object().ok_or(PayloadError::NotAnObject)?;

    let mut out = Vec::with_capacity(obj.len());
    for (key, entry) in obj {
        let Some(channel) = parse_channel_key(key) else {
            continue;
        };
        let Some(estado) = entry.get("estado").and_then(|v| v.as_str()) else {
            continue;
        };
        out.push(ChannelReport {
            channel,
            estado: estado.to_string(),
        });
    }
    Ok(out)
}

fn parse_channel_key(key: &str) -> Option<u16> {
    let digits = key.strip_prefix('p')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Map a hardware `estado` (case-insensitive) to a slot status.
pub fn parse_estado(estado: &str) -> Option<SlotStatus> {
    match estado.trim().to_ascii_lowercase().as_str() {
        "colocando" => Some(SlotStatus::Placing),
        "ocupado" => Some(SlotStatus::Occupied),
        "quitando" => Some(SlotStatus::Removing),
        "libre" => Some(SlotStatus::Free),
        _ => None,
    }
}

pub fn encode_command(kind: CommandKind, channel: u16) -> String {
    match kind {
        CommandKind::Place => format!("p{channel}c"),
        CommandKind::Remove => format!("q{channel}q"),
    }
}
