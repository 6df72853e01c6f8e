//! Channel multiplexer: routes envelopes to the connections they target
//!
//! Every connection owns a bounded queue. Frames are pushed with `try_send`, so
//! a slow consumer loses frames instead of stalling the others.

use crate::envelope::{EventEnvelope, Target};
use crate::error::HubError;
use crate::metrics::HubMetrics;
use crate::protocol::{OutboundFrame, ServerFrame};
use crate::registry::ConnectionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// Outcome of one `deliver` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections targeted when dispatch started
    pub targeted: usize,
    pub delivered: usize,
    /// Frames dropped because the connection's queue was full
    pub dropped: usize,
    /// Connections whose session ended before the frame was queued
    pub disconnected: usize,
}

#[derive(Clone)]
pub struct ChannelMultiplexer {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<HubMetrics>,
}

impl ChannelMultiplexer {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<HubMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Push `envelope` to its targets as resolved right now.
    ///
    /// Failure on one connection never affects the rest of the batch.
    pub fn deliver(&self, envelope: &EventEnvelope) -> DeliveryReport {
        let frame: OutboundFrame = match ServerFrame::event(envelope).and_then(|f| f.to_json()) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(event = envelope.event(), error = %e, "Failed to serialize envelope");
                return DeliveryReport::default();
            }
        };

        let targets = match envelope.target() {
            Target::All => self.registry.all_senders(),
            Target::Channel(channel) => self.registry.channel_senders(channel),
        };

        let mut report = DeliveryReport {
            targeted: targets.len(),
            ..DeliveryReport::default()
        };

        for (connection, sender) in targets {
            match sender.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    let failure = HubError::TransientDeliveryFailure {
                        connection,
                        reason: "outbound queue full".to_string(),
                    };
                    tracing::warn!(event = envelope.event(), "{}", failure);
                }
                Err(TrySendError::Closed(_)) => {
                    // Session is shutting down; unregister follows.
                    report.disconnected += 1;
                    tracing::debug!(connection_id = %connection, "Skipped closing connection");
                }
            }
        }

        self.metrics
            .record_dispatch(report.delivered, report.dropped, report.disconnected);

        tracing::debug!(
            event = envelope.event(),
            source = envelope.source().label(),
            targeted = report.targeted,
            delivered = report.delivered,
            dropped = report.dropped,
            "Envelope delivered"
        );

        report
    }
}
