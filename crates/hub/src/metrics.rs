//! Delivery counters reported through the stats snapshot

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HubMetrics {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    disconnected: AtomicU64,
    malformed: AtomicU64,
    bus_published: AtomicU64,
    bus_publish_failures: AtomicU64,
    bus_received: AtomicU64,
    bus_self_skipped: AtomicU64,
    alerts_stored: AtomicU64,
    alert_store_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub envelopes_dispatched: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub connections_gone: u64,
    pub malformed_upstream: u64,
    pub bus_published: u64,
    pub bus_publish_failures: u64,
    pub bus_received: u64,
    pub bus_self_skipped: u64,
    pub alerts_stored: u64,
    pub alert_store_failures: u64,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self, delivered: usize, dropped: usize, disconnected: usize) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        self.disconnected
            .fetch_add(disconnected as u64, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bus_publish(&self, ok: bool) {
        if ok {
            self.bus_published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bus_publish_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bus_received(&self) {
        self.bus_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bus_self_skipped(&self) {
        self.bus_self_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_store(&self, ok: bool) {
        if ok {
            self.alerts_stored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alert_store_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            envelopes_dispatched: self.dispatched.load(Ordering::Relaxed),
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            connections_gone: self.disconnected.load(Ordering::Relaxed),
            malformed_upstream: self.malformed.load(Ordering::Relaxed),
            bus_published: self.bus_published.load(Ordering::Relaxed),
            bus_publish_failures: self.bus_publish_failures.load(Ordering::Relaxed),
            bus_received: self.bus_received.load(Ordering::Relaxed),
            bus_self_skipped: self.bus_self_skipped.load(Ordering::Relaxed),
            alerts_stored: self.alerts_stored.load(Ordering::Relaxed),
            alert_store_failures: self.alert_store_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = HubMetrics::new();
        metrics.record_dispatch(3, 1, 0);
        metrics.record_dispatch(2, 0, 1);
        metrics.record_malformed();
        metrics.record_bus_publish(true);
        metrics.record_bus_publish(false);
        metrics.record_alert_store(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.envelopes_dispatched, 2);
        assert_eq!(snapshot.frames_delivered, 5);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.connections_gone, 1);
        assert_eq!(snapshot.malformed_upstream, 1);
        assert_eq!(snapshot.bus_published, 1);
        assert_eq!(snapshot.bus_publish_failures, 1);
        assert_eq!(snapshot.alerts_stored, 1);
        assert_eq!(snapshot.alert_store_failures, 0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let value = serde_json::to_value(HubMetrics::new().snapshot()).unwrap();
        assert_eq!(value["framesDropped"], 0);
        assert_eq!(value["busSelfSkipped"], 0);
    }
}
