//! Hub-specific configuration
//!
//! # Environment Variables
//!
//! - `SENTINEL_HUB_NODE_ID` (optional): Identity of this instance on the bus (default: random UUID)
//! - `SENTINEL_HUB_ALERTS_CHANNEL` (optional): Channel receiving client alerts (default: "alerts")
//! - `SENTINEL_HUB_BUS_CHANNEL` (optional): Shared pub/sub channel (default: "sentinel:events")
//! - `SENTINEL_HUB_OUTBOUND_BUFFER` (optional): Per-connection queue size (default: 256)
//! - `SENTINEL_HUB_ALERT_TTL` (optional): Alert cache expiry in seconds (default: 3600)
//! - `SENTINEL_HUB_HEARTBEAT_INTERVAL` (optional): WebSocket ping interval in seconds (default: 30)
//! - `SENTINEL_HUB_CLIENT_TIMEOUT` (optional): Close sessions silent for this long, in seconds (default: 60)
//! - `SENTINEL_HUB_BUS_SUBSCRIBE_TIMEOUT` (optional): Limit on one bus subscribe attempt, in seconds (default: 5)

use sentinel_core::config::{parse_env_var, ConfigLoader};
use sentinel_core::SentinelError;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub node_id: String,
    pub alerts_channel: String,
    pub bus_channel: String,
    pub outbound_buffer: usize,
    pub alert_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub bus_subscribe_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            node_id: Uuid::new_v4().to_string(),
            alerts_channel: "alerts".to_string(),
            bus_channel: "sentinel:events".to_string(),
            outbound_buffer: 256,
            alert_ttl: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(60),
            bus_subscribe_timeout: Duration::from_secs(5),
        }
    }
}

impl HubConfig {
    /// Default configuration with a fixed node id
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }
}

impl ConfigLoader for HubConfig {
    fn from_env() -> Result<Self, SentinelError> {
        let defaults = HubConfig::default();

        let node_id = std::env::var("SENTINEL_HUB_NODE_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.node_id);

        let alerts_channel =
            std::env::var("SENTINEL_HUB_ALERTS_CHANNEL").unwrap_or(defaults.alerts_channel);
        let bus_channel = std::env::var("SENTINEL_HUB_BUS_CHANNEL").unwrap_or(defaults.bus_channel);

        let outbound_buffer =
            parse_env_var("SENTINEL_HUB_OUTBOUND_BUFFER", defaults.outbound_buffer)?;
        let alert_ttl_secs = parse_env_var("SENTINEL_HUB_ALERT_TTL", 3600u64)?;
        let heartbeat_secs = parse_env_var("SENTINEL_HUB_HEARTBEAT_INTERVAL", 30u64)?;
        let timeout_secs = parse_env_var("SENTINEL_HUB_CLIENT_TIMEOUT", 60u64)?;
        let subscribe_secs = parse_env_var("SENTINEL_HUB_BUS_SUBSCRIBE_TIMEOUT", 5u64)?;

        Ok(Self {
            node_id,
            alerts_channel,
            bus_channel,
            outbound_buffer,
            alert_ttl: Duration::from_secs(alert_ttl_secs),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            client_timeout: Duration::from_secs(timeout_secs),
            bus_subscribe_timeout: Duration::from_secs(subscribe_secs),
        })
    }

    fn validate(&self) -> Result<(), SentinelError> {
        if self.alerts_channel.trim().is_empty() {
            return Err(SentinelError::config(
                "alerts channel must not be empty",
                "SENTINEL_HUB_ALERTS_CHANNEL",
            ));
        }

        if self.bus_channel.trim().is_empty() {
            return Err(SentinelError::config(
                "bus channel must not be empty",
                "SENTINEL_HUB_BUS_CHANNEL",
            ));
        }

        if self.outbound_buffer == 0 {
            return Err(SentinelError::config(
                "outbound_buffer must be greater than 0",
                "SENTINEL_HUB_OUTBOUND_BUFFER",
            ));
        }

        if self.alert_ttl.is_zero() {
            return Err(SentinelError::config(
                "alert_ttl must be greater than 0 seconds",
                "SENTINEL_HUB_ALERT_TTL",
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(SentinelError::config(
                "heartbeat_interval must be greater than 0 seconds",
                "SENTINEL_HUB_HEARTBEAT_INTERVAL",
            ));
        }

        if self.bus_subscribe_timeout.is_zero() {
            return Err(SentinelError::config(
                "bus_subscribe_timeout must be greater than 0 seconds",
                "SENTINEL_HUB_BUS_SUBSCRIBE_TIMEOUT",
            ));
        }

        if self.client_timeout <= self.heartbeat_interval {
            return Err(SentinelError::config(
                format!(
                    "client_timeout ({}s) must exceed heartbeat_interval ({}s)",
                    self.client_timeout.as_secs(),
                    self.heartbeat_interval.as_secs()
                ),
                "SENTINEL_HUB_CLIENT_TIMEOUT",
            ));
        }

        Ok(())
    }
}
