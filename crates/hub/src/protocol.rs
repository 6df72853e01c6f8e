//! WebSocket wire protocol
//!
//! Every frame in both directions is a JSON object `{"type": <name>, "data": <value>}`.

use crate::envelope::EventEnvelope;
use crate::registry::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Serialized frame queued for one connection. Shared between all recipients
/// of the same envelope.
pub type OutboundFrame = Arc<str>;

/// Messages a client may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    SendAlert(Value),
    GetStats,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frame sent by the hub to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn connected(id: ConnectionId, at: DateTime<Utc>) -> Self {
        Self::new(
            "connected",
            json!({ "connectionId": id, "timestamp": at }),
        )
    }

    pub fn subscribed(channel: &str) -> Self {
        Self::new("subscribed", json!({ "channel": channel }))
    }

    pub fn unsubscribed(channel: &str) -> Self {
        Self::new("unsubscribed", json!({ "channel": channel }))
    }

    pub fn alert_sent(alert_id: Uuid) -> Self {
        Self::new("alert-sent", json!({ "alertId": alert_id }))
    }

    pub fn stats(stats: Value) -> Self {
        Self::new("stats", stats)
    }

    pub fn error(message: impl ToString) -> Self {
        Self::new("error", json!({ "message": message.to_string() }))
    }

    /// Event frame named after the envelope, carrying the whole envelope
    pub fn event(envelope: &EventEnvelope) -> Result<Self, serde_json::Error> {
        Ok(Self::new(envelope.event(), serde_json::to_value(envelope)?))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
