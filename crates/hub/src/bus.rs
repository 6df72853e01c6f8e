//! Cross-node bridge over a shared publish/subscribe bus
//!
//! Locally originated envelopes are published on one well-known bus channel.
//! Envelopes arriving from the bus go straight to the local multiplexer and are
//! never published again, so replication cannot loop.

use crate::envelope::EventEnvelope;
use crate::error::HubError;
use crate::metrics::HubMetrics;
use crate::multiplexer::{ChannelMultiplexer, DeliveryReport};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use sentinel_core::Backoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Raw messages received on a bus channel
pub type BusStream = BoxStream<'static, String>;

/// Longest a single subscribe attempt may take before it counts as a failure
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), HubError>;

    /// Subscribe to `channel`. The stream ends when the subscription is lost.
    async fn subscribe(&self, channel: &str) -> Result<BusStream, HubError>;

    async fn ping(&self) -> Result<(), HubError>;
}

/// Redis pub/sub transport
pub struct RedisBus {
    client: Client,
    publisher: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBus {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            publisher: Mutex::new(None),
        }
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection, HubError> {
        let mut guard = self.publisher.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HubError::UpstreamUnavailable(format!("Redis connection error: {}", e)))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_conn(&self) {
        *self.publisher.lock().await = None;
    }
}

#[async_trait]
impl BusTransport for RedisBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), HubError> {
        let mut conn = self.get_conn().await?;

        match conn.publish::<_, _, i64>(channel, payload).await {
            Ok(receivers) => {
                tracing::trace!(channel, receivers, "Published to bus");
                Ok(())
            }
            Err(e) => {
                self.reset_conn().await;
                Err(HubError::UpstreamUnavailable(format!(
                    "Redis PUBLISH error: {}",
                    e
                )))
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<BusStream, HubError> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| HubError::UpstreamUnavailable(format!("Redis connection error: {}", e)))?;

        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| HubError::UpstreamUnavailable(format!("Redis SUBSCRIBE error: {}", e)))?;

        tracing::info!(channel, "Subscribed to Redis bus channel");

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping non-text bus payload");
                        None
                    }
                }
            });

        Ok(messages.boxed())
    }

    async fn ping(&self) -> Result<(), HubError> {
        let mut conn = self.get_conn().await?;
        let result = redis::cmd("PING").query_async::<_, String>(&mut conn).await;
        if let Err(e) = result {
            self.reset_conn().await;
            return Err(HubError::UpstreamUnavailable(format!(
                "Redis PING error: {}",
                e
            )));
        }
        Ok(())
    }
}

/// In-process transport. Every hub sharing one `MemoryBus` sees every
/// message, including its own, like Redis pub/sub.
#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<(String, String)>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl BusTransport for MemoryBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), HubError> {
        // No subscribers is not an error on a pub/sub bus.
        let _ = self.sender.send((channel.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusStream, HubError> {
        let receiver = self.sender.subscribe();
        let channel = channel.to_string();

        let messages = stream::unfold(receiver, move |mut receiver| {
            let channel = channel.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok((name, payload)) if name == channel => return Some((payload, receiver)),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(channel = %channel, skipped, "Memory bus subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(messages.boxed())
    }

    async fn ping(&self) -> Result<(), HubError> {
        Ok(())
    }
}

pub struct CrossNodeBridge {
    node_id: String,
    channel: String,
    transport: Arc<dyn BusTransport>,
    multiplexer: ChannelMultiplexer,
    metrics: Arc<HubMetrics>,
    subscribe_timeout: Duration,
}

impl CrossNodeBridge {
    pub fn new(
        node_id: impl Into<String>,
        channel: impl Into<String>,
        transport: Arc<dyn BusTransport>,
        multiplexer: ChannelMultiplexer,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            channel: channel.into(),
            transport,
            multiplexer,
            metrics,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
        }
    }

    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    pub async fn ping(&self) -> Result<(), HubError> {
        self.transport.ping().await
    }

    /// Replicate a locally originated envelope to sibling instances.
    ///
    /// Envelopes built by another node are skipped.
    pub async fn publish(&self, envelope: &EventEnvelope) -> Result<(), HubError> {
        if envelope.origin() != self.node_id {
            tracing::debug!(
                origin = envelope.origin(),
                event = envelope.event(),
                "Not republishing foreign envelope"
            );
            return Ok(());
        }

        let payload = serde_json::to_string(envelope)?;
        let result = self.transport.publish(&self.channel, payload).await;
        self.metrics.record_bus_publish(result.is_ok());

        if let Err(e) = &result {
            tracing::warn!(channel = %self.channel, event = envelope.event(), error = %e, "Bus publish failed");
        }
        result
    }

    /// Deliver one raw bus message locally.
    ///
    /// Returns `None` for malformed messages and for this node's own echoes.
    pub fn handle_inbound(&self, raw: &str) -> Option<DeliveryReport> {
        self.metrics.record_bus_received();

        let envelope: EventEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.record_malformed();
                let err = HubError::malformed(format!("bus:{}", self.channel), e);
                tracing::warn!("{}", err);
                return None;
            }
        };

        if envelope.origin() == self.node_id {
            // Already delivered locally before it was published.
            self.metrics.record_bus_self_skipped();
            return None;
        }

        tracing::debug!(
            origin = envelope.origin(),
            event = envelope.event(),
            "Delivering envelope from sibling node"
        );
        Some(self.multiplexer.deliver(&envelope))
    }

    /// Drain `messages` until the subscription ends
    pub async fn consume(&self, mut messages: BusStream) {
        while let Some(raw) = messages.next().await {
            self.handle_inbound(&raw);
        }
    }

    /// One subscribe attempt, failed if it outlasts the subscribe timeout
    async fn open_subscription(&self) -> Result<BusStream, HubError> {
        match tokio::time::timeout(self.subscribe_timeout, self.transport.subscribe(&self.channel))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HubError::UpstreamUnavailable(format!(
                "bus subscribe timed out after {}ms",
                self.subscribe_timeout.as_millis()
            ))),
        }
    }

    /// Subscribe and keep the subscription alive for the life of the task.
    ///
    /// The first subscription attempt completes (or times out) before this
    /// returns, so messages published afterwards are not missed when the bus
    /// is up, and an unresponsive bus cannot hold up startup.
    pub async fn start(self: Arc<Self>) -> JoinHandle<()> {
        let initial = self.open_subscription().await;

        tokio::spawn(async move {
            let mut backoff = Backoff::default();
            let mut next = Some(initial);

            loop {
                let attempt = match next.take() {
                    Some(result) => result,
                    None => self.open_subscription().await,
                };

                match attempt {
                    Ok(messages) => {
                        backoff.reset();
                        self.consume(messages).await;
                        tracing::warn!(channel = %self.channel, "Bus subscription ended, reconnecting");
                    }
                    Err(e) => {
                        tracing::warn!(
                            channel = %self.channel,
                            attempt = backoff.attempt(),
                            error = %e,
                            "Bus unavailable, serving local connections only"
                        );
                    }
                }

                backoff.wait().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn bridge(node_id: &str, bus: MemoryBus) -> (Arc<ConnectionRegistry>, Arc<HubMetrics>, CrossNodeBridge) {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(HubMetrics::new());
        let multiplexer = ChannelMultiplexer::new(registry.clone(), metrics.clone());
        let bridge = CrossNodeBridge::new(
            node_id,
            "sentinel:events",
            Arc::new(bus),
            multiplexer,
            metrics.clone(),
        );
        (registry, metrics, bridge)
    }

    #[test]
    fn test_inbound_from_sibling_is_delivered() {
        let (registry, _metrics, bridge) = bridge("node-a", MemoryBus::default());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(tx);

        let envelope = EventEnvelope::from_stream("flood-alerts", json!({"level": 1}), "node-b");
        let raw = serde_json::to_string(&envelope).unwrap();

        let report = bridge.handle_inbound(&raw).unwrap();
        assert_eq!(report.delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_own_echo_is_skipped() {
        let (registry, metrics, bridge) = bridge("node-a", MemoryBus::default());
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(tx);

        let envelope = EventEnvelope::from_stream("flood-alerts", json!({}), "node-a");
        let raw = serde_json::to_string(&envelope).unwrap();

        assert!(bridge.handle_inbound(&raw).is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().bus_self_skipped, 1);
    }

    #[test]
    fn test_malformed_inbound_is_dropped() {
        let (_registry, metrics, bridge) = bridge("node-a", MemoryBus::default());

        assert!(bridge.handle_inbound("{not json").is_none());
        assert!(bridge.handle_inbound(r#"{"event":"x"}"#).is_none());
        assert_eq!(metrics.snapshot().malformed_upstream, 2);
    }

    #[tokio::test]
    async fn test_foreign_envelope_not_republished() {
        let bus = MemoryBus::default();
        let mut observer = bus.subscribe("sentinel:events").await.unwrap();
        let (_registry, metrics, bridge) = bridge("node-a", bus);

        let foreign = EventEnvelope::from_stream("sensor-data", json!({}), "node-b");
        bridge.publish(&foreign).await.unwrap();
        let local = EventEnvelope::from_stream("sensor-data", json!({"n": 1}), "node-a");
        bridge.publish(&local).await.unwrap();

        let raw = observer.next().await.unwrap();
        let received: EventEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(received.id(), local.id());
        assert_eq!(metrics.snapshot().bus_published, 1);
    }

    struct UnresponsiveBus;

    #[async_trait]
    impl BusTransport for UnresponsiveBus {
        async fn publish(&self, _channel: &str, _payload: String) -> Result<(), HubError> {
            Ok(())
        }

        async fn subscribe(&self, _channel: &str) -> Result<BusStream, HubError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), HubError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_start_returns_when_bus_never_answers() {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(HubMetrics::new());
        let bridge = CrossNodeBridge::new(
            "node-a",
            "sentinel:events",
            Arc::new(UnresponsiveBus),
            ChannelMultiplexer::new(registry, metrics.clone()),
            metrics,
        )
        .with_subscribe_timeout(Duration::from_millis(50));

        let started = tokio::time::timeout(Duration::from_secs(2), Arc::new(bridge).start()).await;

        let task = started.expect("start should not wait on an unresponsive bus");
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_memory_bus_filters_by_channel() {
        let bus = MemoryBus::default();
        let mut events = bus.subscribe("events").await.unwrap();

        bus.publish("other", "ignored".to_string()).await.unwrap();
        bus.publish("events", "wanted".to_string()).await.unwrap();

        assert_eq!(events.next().await.unwrap(), "wanted");
    }
}
