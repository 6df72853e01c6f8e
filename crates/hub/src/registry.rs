//! Connection registry: live connections and their channel memberships
//!
//! Connections and channels are kept in one structure behind a single lock so
//! that a membership change updates both sides in one step.

use crate::error::HubError;
use crate::protocol::OutboundFrame;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for a client connection
pub type ConnectionId = Uuid;

/// Handle used to queue frames for one connection
pub type OutboundSender = mpsc::Sender<OutboundFrame>;

struct Connection {
    connected_at: DateTime<Utc>,
    channels: BTreeSet<String>,
    outbound: OutboundSender,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, Connection>,
    /// Channel name -> members. Channels with no members are removed.
    channels: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

/// Point-in-time view used for statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub total_connections: usize,
    pub connections: Vec<ConnectionSummary>,
    /// Channel name -> member count
    pub channels: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    pub channels: Vec<String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with no memberships
    pub fn register(&self, outbound: OutboundSender) -> ConnectionId {
        self.register_with(outbound, |_, _, _| ())
    }

    /// Register a new connection, running `prepare` before it becomes visible
    /// to dispatch. Frames queued by `prepare` precede every broadcast.
    pub fn register_with<F>(&self, outbound: OutboundSender, prepare: F) -> ConnectionId
    where
        F: FnOnce(ConnectionId, DateTime<Utc>, &OutboundSender),
    {
        let id = Uuid::new_v4();
        let connected_at = Utc::now();
        prepare(id, connected_at, &outbound);

        let connection = Connection {
            connected_at,
            channels: BTreeSet::new(),
            outbound,
        };

        let total = {
            let mut state = self.state.lock();
            state.connections.insert(id, connection);
            state.connections.len()
        };

        tracing::info!(connection_id = %id, total, "Registered connection");
        id
    }

    /// Remove a connection and every membership it holds.
    ///
    /// Returns `false` for unknown ids.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut state = self.state.lock();
        let Some(connection) = state.connections.remove(&id) else {
            return false;
        };

        for channel in &connection.channels {
            remove_member(&mut state.channels, channel, id);
        }
        let total = state.connections.len();
        drop(state);

        tracing::info!(
            connection_id = %id,
            channels = connection.channels.len(),
            total,
            "Unregistered connection"
        );
        true
    }

    /// Add `id` to `channel`.
    ///
    /// Returns `Ok(false)` when the connection was already a member.
    pub fn join(&self, id: ConnectionId, channel: &str) -> Result<bool, HubError> {
        if channel.trim().is_empty() {
            return Err(HubError::InvalidRequest(
                "channel name must not be empty".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let connection = state
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection(id))?;

        if !connection.channels.insert(channel.to_string()) {
            return Ok(false);
        }

        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        drop(state);

        tracing::debug!(connection_id = %id, channel, "Joined channel");
        Ok(true)
    }

    /// Remove `id` from `channel`. No-op when not a member or unknown.
    pub fn leave(&self, id: ConnectionId, channel: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state
            .connections
            .get_mut(&id)
            .map(|c| c.channels.remove(channel))
            .unwrap_or(false);

        if removed {
            remove_member(&mut state.channels, channel, id);
            drop(state);
            tracing::debug!(connection_id = %id, channel, "Left channel");
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.state.lock().connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Current members of `channel`
    pub fn channel_members(&self, channel: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Channels `id` has joined, or `None` when unknown
    pub fn memberships(&self, id: ConnectionId) -> Option<Vec<String>> {
        self.state
            .lock()
            .connections
            .get(&id)
            .map(|c| c.channels.iter().cloned().collect())
    }

    /// Outbound handles of every registered connection
    pub fn all_senders(&self) -> Vec<(ConnectionId, OutboundSender)> {
        self.state
            .lock()
            .connections
            .iter()
            .map(|(id, c)| (*id, c.outbound.clone()))
            .collect()
    }

    /// Outbound handles of the current members of `channel`
    pub fn channel_senders(&self, channel: &str) -> Vec<(ConnectionId, OutboundSender)> {
        let state = self.state.lock();
        let Some(members) = state.channels.get(channel) else {
            return Vec::new();
        };

        members
            .iter()
            .filter_map(|id| {
                state
                    .connections
                    .get(id)
                    .map(|c| (*id, c.outbound.clone()))
            })
            .collect()
    }

    /// Consistent view of connections and channels, copied under the lock
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock();

        let mut connections: Vec<ConnectionSummary> = state
            .connections
            .iter()
            .map(|(id, c)| ConnectionSummary {
                id: *id,
                connected_at: c.connected_at,
                channels: c.channels.iter().cloned().collect(),
            })
            .collect();
        let channels = state
            .channels
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect();
        drop(state);

        connections.sort_by_key(|c| c.connected_at);

        RegistrySnapshot {
            total_connections: connections.len(),
            connections,
            channels,
        }
    }
}

fn remove_member(
    channels: &mut HashMap<String, HashSet<ConnectionId>>,
    channel: &str,
    id: ConnectionId,
) {
    if let Some(members) = channels.get_mut(channel) {
        members.remove(&id);
        if members.is_empty() {
            channels.remove(channel);
        }
    }
}
