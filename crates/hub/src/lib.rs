//! # Sentinel Realtime Hub
//!
//! Real-time event distribution for AI-Sentinel. Records from external Kafka
//! topics and alerts submitted by clients are fanned out to WebSocket
//! connections, and replicated over Redis pub/sub so any number of hub
//! instances behave as one broadcaster.
//!
//! ## Modules
//!
//! - `registry`: Live connections and channel memberships
//! - `multiplexer`: Routes envelopes to their target connections
//! - `stream`: Kafka topics into the hub
//! - `bus`: Cross-node replication over a shared pub/sub bus
//! - `alerts`: Short-lived alert cache
//! - `hub`: Operations used by sessions and the HTTP surface
//! - `websocket`: Per-client session actor
//! - `server`: HTTP routes and server

pub mod alerts;
pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod multiplexer;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stream;
pub mod websocket;

pub use alerts::{AlertRecord, AlertStore, MemoryAlertStore, RedisAlertStore};
pub use bus::{BusTransport, CrossNodeBridge, MemoryBus, RedisBus};
pub use config::HubConfig;
pub use envelope::{EventEnvelope, EventSource, Target};
pub use error::HubError;
pub use hub::{BroadcastRequest, Hub, HubStats, HubTasks};
pub use multiplexer::{ChannelMultiplexer, DeliveryReport};
pub use protocol::{ClientMessage, OutboundFrame, ServerFrame};
pub use registry::{ConnectionId, ConnectionRegistry, RegistrySnapshot};
pub use stream::{KafkaStreamSource, StreamBridge, StreamRecord};
