//! Stream bridge: external topic records into the hub
//!
//! Each record becomes a `<topic>-event` envelope broadcast to every local
//! connection and queued for replication. Bad records are logged and dropped;
//! the consume loop never stops on them.

use crate::envelope::EventEnvelope;
use crate::error::HubError;
use crate::hub::Hub;
use crate::multiplexer::DeliveryReport;
use futures_util::{pin_mut, Stream, StreamExt};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use sentinel_core::{Backoff, KafkaConfig};
use serde_json::Value;
use std::sync::Arc;

/// One record read from the external stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub topic: String,
    pub payload: Option<Vec<u8>>,
}

impl StreamRecord {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: Some(payload.into()),
        }
    }
}

pub struct StreamBridge {
    hub: Arc<Hub>,
}

impl StreamBridge {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Decode a record payload as JSON
    pub fn parse_record(topic: &str, payload: Option<&[u8]>) -> Result<Value, HubError> {
        match payload {
            None | Some([]) => Err(HubError::malformed(topic, "empty payload")),
            Some(bytes) => serde_json::from_slice(bytes).map_err(|e| HubError::malformed(topic, e)),
        }
    }

    /// Turn one record into an envelope and dispatch it
    pub fn handle_record(
        &self,
        topic: &str,
        payload: Option<&[u8]>,
    ) -> Result<DeliveryReport, HubError> {
        let value = match Self::parse_record(topic, payload) {
            Ok(value) => value,
            Err(e) => {
                self.hub.metrics().record_malformed();
                tracing::warn!(topic, "Dropping stream record: {}", e);
                return Err(e);
            }
        };

        let envelope = EventEnvelope::from_stream(topic, value, self.hub.node_id());
        Ok(self.hub.dispatch(envelope))
    }

    /// Consume `records` until the stream ends. Returns how many were dispatched.
    pub async fn pump<S>(&self, records: S) -> usize
    where
        S: Stream<Item = StreamRecord>,
    {
        pin_mut!(records);
        let mut dispatched = 0;

        while let Some(record) = records.next().await {
            if self
                .handle_record(&record.topic, record.payload.as_deref())
                .is_ok()
            {
                dispatched += 1;
            }
        }

        dispatched
    }

    /// Consume from Kafka forever. Receive errors back off and retry; the
    /// hub keeps serving while the stream is down.
    pub async fn run_kafka(&self, source: KafkaStreamSource) {
        let mut backoff = Backoff::default();

        tracing::info!(topics = ?source.topics(), "Stream bridge consuming");

        loop {
            // The borrowed message must not live across the sleep below.
            let retry_in = match source.consumer.recv().await {
                Ok(message) => {
                    backoff.reset();
                    // Malformed records are already logged.
                    let _ = self.handle_record(message.topic(), message.payload());
                    None
                }
                Err(e) => {
                    let err = HubError::UpstreamUnavailable(format!("Kafka receive error: {}", e));
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "{}",
                        err
                    );
                    Some(delay)
                }
            };

            if let Some(delay) = retry_in {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Kafka consumer subscribed to the configured topics.
///
/// The consumer group is unique to the node, so every instance receives every
/// record.
pub struct KafkaStreamSource {
    consumer: StreamConsumer,
    topics: Vec<String>,
}

impl KafkaStreamSource {
    pub fn new(config: &KafkaConfig, node_id: &str) -> Result<Self, HubError> {
        let group_id = config.group_id(node_id);

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .set(
                "session.timeout.ms",
                config.session_timeout.as_millis().to_string(),
            )
            .set("reconnect.backoff.ms", "250")
            .set("reconnect.backoff.max.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                HubError::UpstreamUnavailable(format!("Failed to create Kafka consumer: {}", e))
            })?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics).map_err(|e| {
            HubError::UpstreamUnavailable(format!("Failed to subscribe to topics: {}", e))
        })?;

        tracing::info!(
            brokers = %config.brokers,
            group_id = %group_id,
            topics = ?config.topics,
            "Kafka consumer created"
        );

        Ok(Self {
            consumer,
            topics: config.topics.clone(),
        })
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}
