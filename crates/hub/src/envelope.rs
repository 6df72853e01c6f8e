//! Event envelope: the immutable unit of distribution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Delivery scope of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "channel", rename_all = "snake_case")]
pub enum Target {
    /// Every registered connection, regardless of membership
    All,
    /// Current members of one channel
    Channel(String),
}

/// Where an envelope entered the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventSource {
    Stream { topic: String },
    Client,
    Admin,
}

impl EventSource {
    pub fn label(&self) -> &str {
        match self {
            EventSource::Stream { topic } => topic,
            EventSource::Client => "client",
            EventSource::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    id: Uuid,
    event: String,
    source: EventSource,
    target: Target,
    payload: Value,
    timestamp: DateTime<Utc>,
    /// Node id of the hub instance that built this envelope
    origin: String,
}

impl EventEnvelope {
    /// Stream record on `topic`, broadcast to every connection as `<topic>-event`
    pub fn from_stream(topic: &str, payload: Value, origin: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: format!("{}-event", topic),
            source: EventSource::Stream {
                topic: topic.to_string(),
            },
            target: Target::All,
            payload,
            timestamp: Utc::now(),
            origin: origin.to_string(),
        }
    }

    /// Client alert routed to the alerts channel; the envelope id is the alert id
    pub fn alert(
        id: Uuid,
        payload: Value,
        alerts_channel: &str,
        timestamp: DateTime<Utc>,
        origin: &str,
    ) -> Self {
        Self {
            id,
            event: "alert".to_string(),
            source: EventSource::Client,
            target: Target::Channel(alerts_channel.to_string()),
            payload,
            timestamp,
            origin: origin.to_string(),
        }
    }

    /// Externally injected event
    pub fn admin(event: impl Into<String>, payload: Value, target: Target, origin: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: event.into(),
            source: EventSource::Admin,
            target,
            payload,
            timestamp: Utc::now(),
            origin: origin.to_string(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}
