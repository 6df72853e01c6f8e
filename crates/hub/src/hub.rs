//! Hub: ties the registry, multiplexer, cross-node bridge and alert store
//! together behind the operations sessions and the HTTP surface call.

use crate::alerts::{AlertRecord, AlertStore};
use crate::bus::{BusTransport, CrossNodeBridge};
use crate::config::HubConfig;
use crate::envelope::{EventEnvelope, Target};
use crate::error::HubError;
use crate::metrics::{HubMetrics, MetricsSnapshot};
use crate::multiplexer::{ChannelMultiplexer, DeliveryReport};
use crate::protocol::{ClientMessage, OutboundFrame, ServerFrame};
use crate::registry::{ConnectionId, ConnectionRegistry, RegistrySnapshot};
use chrono::Utc;
use parking_lot::Mutex;
use sentinel_core::{retry_with_backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Envelopes waiting to be published on the bus
const REPLICATION_QUEUE_SIZE: usize = 1024;

/// Administrative injection request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BroadcastRequest {
    pub event: Option<String>,
    pub data: Option<Value>,
    pub channel: Option<String>,
}

/// Statistics reported by `get-stats` and `GET /stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub node_id: String,
    #[serde(flatten)]
    pub registry: RegistrySnapshot,
    pub metrics: MetricsSnapshot,
}

/// Background tasks owned by a started hub
pub struct HubTasks {
    pub subscriber: JoinHandle<()>,
    pub publisher: JoinHandle<()>,
}

impl HubTasks {
    pub fn abort(&self) {
        self.subscriber.abort();
        self.publisher.abort();
    }
}

pub struct Hub {
    config: HubConfig,
    registry: Arc<ConnectionRegistry>,
    multiplexer: ChannelMultiplexer,
    bridge: Arc<CrossNodeBridge>,
    alerts: Arc<dyn AlertStore>,
    metrics: Arc<HubMetrics>,
    replication: mpsc::Sender<EventEnvelope>,
    replication_queue: Mutex<Option<mpsc::Receiver<EventEnvelope>>>,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        transport: Arc<dyn BusTransport>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(HubMetrics::new());
        let multiplexer = ChannelMultiplexer::new(registry.clone(), metrics.clone());
        let bridge = Arc::new(CrossNodeBridge::new(
            config.node_id.clone(),
            config.bus_channel.clone(),
            transport,
            multiplexer.clone(),
            metrics.clone(),
        )
        .with_subscribe_timeout(config.bus_subscribe_timeout));
        let (replication, queue) = mpsc::channel(REPLICATION_QUEUE_SIZE);

        Self {
            config,
            registry,
            multiplexer,
            bridge,
            alerts,
            metrics,
            replication,
            replication_queue: Mutex::new(Some(queue)),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &HubMetrics {
        &self.metrics
    }

    /// Subscribe to the bus and start the ordered bus publisher.
    ///
    /// Can only be called once per hub.
    pub async fn start(&self) -> Result<HubTasks, HubError> {
        let mut queue = self
            .replication_queue
            .lock()
            .take()
            .ok_or_else(|| HubError::InvalidRequest("hub already started".to_string()))?;

        let subscriber = self.bridge.clone().start().await;

        let bridge = self.bridge.clone();
        let publisher = tokio::spawn(async move {
            while let Some(envelope) = queue.recv().await {
                // Failures are counted and logged by the bridge.
                let _ = bridge.publish(&envelope).await;
            }
        });

        tracing::info!(
            node_id = %self.config.node_id,
            bus_channel = %self.config.bus_channel,
            "Hub started"
        );

        Ok(HubTasks {
            subscriber,
            publisher,
        })
    }

    /// Register a session. The `connected` frame is the first frame it receives.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer);

        let id = self.registry.register_with(tx, |id, at, outbound| {
            match ServerFrame::connected(id, at).to_json() {
                Ok(json) => {
                    let _ = outbound.try_send(json.into());
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode connected frame"),
            }
        });

        (id, rx)
    }

    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.registry.unregister(id)
    }

    /// Handle one parsed client message and produce the reply frame
    pub fn handle_client_message(
        &self,
        id: ConnectionId,
        message: ClientMessage,
    ) -> Result<ServerFrame, HubError> {
        match message {
            ClientMessage::Subscribe { channel } => {
                self.registry.join(id, &channel)?;
                Ok(ServerFrame::subscribed(&channel))
            }
            ClientMessage::Unsubscribe { channel } => {
                self.registry.leave(id, &channel);
                Ok(ServerFrame::unsubscribed(&channel))
            }
            ClientMessage::SendAlert(payload) => {
                let alert_id = self.submit_alert(id, payload)?;
                Ok(ServerFrame::alert_sent(alert_id))
            }
            ClientMessage::GetStats => Ok(ServerFrame::stats(serde_json::to_value(self.stats())?)),
        }
    }

    /// Handle one raw text frame. Failures become an `error` frame for the
    /// sender only.
    pub fn handle_client_text(&self, id: ConnectionId, text: &str) -> ServerFrame {
        let result = ClientMessage::parse(text)
            .map_err(|e| HubError::InvalidRequest(format!("unrecognised message: {}", e)))
            .and_then(|message| self.handle_client_message(id, message));

        result.unwrap_or_else(|e| {
            tracing::debug!(connection_id = %id, error = %e, "Client message rejected");
            ServerFrame::error(e)
        })
    }

    /// Accept an alert from a connection and route it to the alerts channel.
    ///
    /// The id is returned as soon as local delivery is done; caching and bus
    /// replication continue in the background.
    pub fn submit_alert(&self, id: ConnectionId, payload: Value) -> Result<Uuid, HubError> {
        if !self.registry.contains(id) {
            return Err(HubError::UnknownConnection(id));
        }

        let Value::Object(mut fields) = payload else {
            return Err(HubError::InvalidRequest(
                "alert payload must be a JSON object".to_string(),
            ));
        };

        let alert_id = Uuid::new_v4();
        let timestamp = Utc::now();
        fields.insert("id".to_string(), json!(alert_id));
        fields.insert("timestamp".to_string(), json!(timestamp));
        let payload = Value::Object(fields);

        let record = AlertRecord::new(alert_id, payload.clone(), self.config.alert_ttl);
        let store = self.alerts.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let result = retry_with_backoff(
                || store.store(&record),
                RetryPolicy::default(),
                |e: &HubError| matches!(e, HubError::Cache(_)),
            )
            .await;
            metrics.record_alert_store(result.is_ok());
            if let Err(e) = result {
                tracing::warn!(alert_id = %record.id, error = %e, "Failed to cache alert");
            }
        });

        let envelope = EventEnvelope::alert(
            alert_id,
            payload,
            &self.config.alerts_channel,
            timestamp,
            &self.config.node_id,
        );

        tracing::info!(connection_id = %id, alert_id = %alert_id, "Alert submitted");
        self.dispatch(envelope);
        Ok(alert_id)
    }

    /// Route an externally supplied event. No alert record is kept.
    pub fn inject(&self, request: BroadcastRequest) -> Result<DeliveryReport, HubError> {
        let event = request
            .event
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| HubError::InvalidRequest("event is required".to_string()))?;
        let data = request
            .data
            .ok_or_else(|| HubError::InvalidRequest("data is required".to_string()))?;

        let target = match request.channel.filter(|c| !c.trim().is_empty()) {
            Some(channel) => Target::Channel(channel),
            None => Target::All,
        };

        let envelope = EventEnvelope::admin(event, data, target, &self.config.node_id);
        Ok(self.dispatch(envelope))
    }

    /// Deliver locally, then queue for bus replication without waiting on it
    pub fn dispatch(&self, envelope: EventEnvelope) -> DeliveryReport {
        let report = self.multiplexer.deliver(&envelope);

        match self.replication.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                self.metrics.record_bus_publish(false);
                tracing::warn!(
                    event = envelope.event(),
                    "Replication queue full, envelope not published"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Replication publisher stopped");
            }
        }

        report
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            node_id: self.config.node_id.clone(),
            registry: self.registry.snapshot(),
            metrics: self.metrics.snapshot(),
        }
    }

    pub async fn fetch_alert(&self, id: Uuid) -> Result<Option<AlertRecord>, HubError> {
        self.alerts.fetch(id).await
    }

    /// Both upstream dependencies reachable
    pub async fn readiness(&self) -> Result<(), HubError> {
        self.bridge.ping().await?;
        self.alerts.ping().await?;
        Ok(())
    }
}
