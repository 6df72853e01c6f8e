//! Realtime hub service entry point
//!
//! Starts the WebSocket/HTTP surface, the Redis cross-node bridge and the
//! Kafka stream bridge. Redis or Kafka being unreachable only degrades the
//! service; failing to bind the listen address is fatal.

use anyhow::Context;
use sentinel_core::{
    init_logging, load_dotenv, ConfigLoader, KafkaConfig, LogConfig, RedisConfig, ServiceConfig,
};
use sentinel_hub::{
    server, Hub, HubConfig, KafkaStreamSource, RedisAlertStore, RedisBus, StreamBridge,
};
use std::sync::Arc;
use tracing::{error, info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let service = ServiceConfig::from_env()?;
    service.validate()?;
    init_logging(&LogConfig::new(service.log_level.clone(), service.log_format));

    let hub_config = HubConfig::from_env()?;
    hub_config.validate()?;
    let redis_config = RedisConfig::from_env()?;
    redis_config.validate()?;
    let kafka_config = KafkaConfig::from_env()?;
    kafka_config.validate()?;

    info!(
        node_id = %hub_config.node_id,
        host = %service.host,
        port = service.port,
        "Starting realtime hub"
    );

    let redis_client =
        redis::Client::open(redis_config.url.as_str()).context("Invalid Redis URL")?;
    let hub = Arc::new(Hub::new(
        hub_config,
        Arc::new(RedisBus::new(redis_client.clone())),
        Arc::new(RedisAlertStore::new(redis_client)),
    ));

    match tokio::time::timeout(redis_config.connection_timeout, hub.readiness()).await {
        Ok(Ok(())) => info!("Redis reachable"),
        Ok(Err(e)) => warn!(error = %e, "Redis unavailable, starting degraded"),
        Err(_) => warn!("Redis readiness check timed out, starting degraded"),
    }

    let tasks = hub.start().await?;

    let stream_task = match KafkaStreamSource::new(&kafka_config, hub.node_id()) {
        Ok(source) => {
            let bridge = StreamBridge::new(hub.clone());
            Some(tokio::spawn(async move { bridge.run_kafka(source).await }))
        }
        Err(e) => {
            error!(error = %e, "Stream bridge disabled");
            None
        }
    };

    let result = server::run(hub, &service.host, service.port).await;

    tasks.abort();
    if let Some(task) = stream_task {
        task.abort();
    }

    result.context("HTTP server failed")?;
    info!("Realtime hub stopped");
    Ok(())
}
