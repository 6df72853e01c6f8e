//! Short-lived alert cache
//!
//! Client-submitted alerts are kept for a fixed TTL so external collaborators
//! can look them up by id. Live delivery never depends on this store.

use crate::error::HubError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Cached alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: Uuid,
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(id: Uuid, payload: Value, ttl: Duration) -> Self {
        let stored_at = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1));
        Self {
            id,
            payload,
            stored_at,
            expires_at: stored_at + ttl,
        }
    }

    pub fn cache_key(id: Uuid) -> String {
        format!("alert:{}", id)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whole seconds left before expiry, at least 1
    fn ttl_secs(&self) -> u64 {
        (self.expires_at - self.stored_at).num_seconds().max(1) as u64
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn store(&self, record: &AlertRecord) -> Result<(), HubError>;

    /// `None` when absent or expired
    async fn fetch(&self, id: Uuid) -> Result<Option<AlertRecord>, HubError>;

    async fn ping(&self) -> Result<(), HubError>;
}

/// Redis-backed store: `SET alert:<id> <json> EX <ttl>`
#[derive(Clone)]
pub struct RedisAlertStore {
    client: Client,
}

impl RedisAlertStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_conn(&self) -> Result<MultiplexedConnection, HubError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HubError::Cache(format!("Redis connection error: {}", e)))
    }
}

#[async_trait]
impl AlertStore for RedisAlertStore {
    async fn store(&self, record: &AlertRecord) -> Result<(), HubError> {
        let mut conn = self.get_conn().await?;
        let value = serde_json::to_string(record)?;

        redis::cmd("SET")
            .arg(AlertRecord::cache_key(record.id))
            .arg(value)
            .arg("EX")
            .arg(record.ttl_secs())
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| HubError::Cache(format!("Redis SET error: {}", e)))?;

        tracing::debug!(alert_id = %record.id, ttl_secs = record.ttl_secs(), "Alert cached");
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<AlertRecord>, HubError> {
        let mut conn = self.get_conn().await?;

        let value: Option<String> = conn
            .get(AlertRecord::cache_key(id))
            .await
            .map_err(|e| HubError::Cache(format!("Redis GET error: {}", e)))?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), HubError> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| HubError::Cache(format!("Redis PING error: {}", e)))
    }
}

/// In-process store for tests and single-node deployments without Redis
#[derive(Default)]
pub struct MemoryAlertStore {
    records: Mutex<HashMap<Uuid, AlertRecord>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records currently held, expired ones included
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn store(&self, record: &AlertRecord) -> Result<(), HubError> {
        let now = Utc::now();
        let mut records = self.records.lock();
        records.retain(|_, r| !r.is_expired_at(now));
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<AlertRecord>, HubError> {
        let mut records = self.records.lock();
        match records.get(&id) {
            Some(record) if record.is_expired_at(Utc::now()) => {
                records.remove(&id);
                Ok(None)
            }
            Some(record) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), HubError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_expiry() {
        let record = AlertRecord::new(Uuid::new_v4(), json!({}), Duration::from_secs(3600));

        assert_eq!(record.ttl_secs(), 3600);
        assert!(!record.is_expired_at(record.stored_at));
        assert!(record.is_expired_at(record.stored_at + ChronoDuration::hours(1)));
    }

    #[test]
    fn test_cache_key() {
        let id = Uuid::nil();
        assert_eq!(
            AlertRecord::cache_key(id),
            "alert:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryAlertStore::new();
        let record = AlertRecord::new(
            Uuid::new_v4(),
            json!({"type": "evacuation"}),
            Duration::from_secs(60),
        );

        store.store(&record).await.unwrap();

        let fetched = store.fetch(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.payload["type"], "evacuation");
        assert!(store.fetch(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_store_hides_expired() {
        let store = MemoryAlertStore::new();
        let mut record = AlertRecord::new(Uuid::new_v4(), json!({}), Duration::from_secs(60));
        record.expires_at = record.stored_at - ChronoDuration::seconds(1);

        store.store(&record).await.unwrap();

        assert!(store.fetch(record.id).await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
