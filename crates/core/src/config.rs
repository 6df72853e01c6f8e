//! Shared configuration loader module for Sentinel services
//!
//! Configuration is read from environment variables carrying the `SENTINEL_`
//! prefix, with the conventional unprefixed names (`REDIS_URL`, `PORT`, ...)
//! accepted as fallbacks. A `.env` file is honoured via dotenvy.
//!
//! Override hierarchy: defaults < .env < environment.
//!
//! # Example
//!
//! ```no_run
//! use sentinel_core::config::{load_dotenv, ConfigLoader, KafkaConfig, RedisConfig, ServiceConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! load_dotenv();
//!
//! let service = ServiceConfig::from_env()?;
//! let redis = RedisConfig::from_env()?;
//! let kafka = KafkaConfig::from_env()?;
//!
//! service.validate()?;
//! redis.validate()?;
//! kafka.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::SentinelError;
use crate::observability::LogFormat;
use std::time::Duration;
use url::Url;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, applying defaults for
    /// anything not set.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a set value cannot be parsed.
    fn from_env() -> Result<Self, SentinelError>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` naming the offending key.
    fn validate(&self) -> Result<(), SentinelError>;
}

/// HTTP service configuration
///
/// # Environment Variables
///
/// - `SENTINEL_SERVICE_HOST` (optional): Bind host (default: "0.0.0.0", fallback `HOST`)
/// - `SENTINEL_SERVICE_PORT` (optional): Bind port (default: 8080, fallback `PORT`)
/// - `SENTINEL_SERVICE_LOG_LEVEL` (optional): Log level (default: "info"); full `RUST_LOG`
///   directives are applied by the logging layer instead
/// - `SENTINEL_SERVICE_LOG_FORMAT` (optional): "pretty" or "json" (default: "pretty")
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service bind host
    pub host: String,
    /// Service bind port
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, SentinelError> {
        let defaults = ServiceConfig::default();

        let host = std::env::var("SENTINEL_SERVICE_HOST")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or(defaults.host);

        let port = match std::env::var("SENTINEL_SERVICE_PORT") {
            Ok(_) => parse_env_var("SENTINEL_SERVICE_PORT", defaults.port)?,
            Err(_) => parse_env_var("PORT", defaults.port)?,
        };

        let log_level =
            std::env::var("SENTINEL_SERVICE_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_format = parse_env_var("SENTINEL_SERVICE_LOG_FORMAT", defaults.log_format)?;

        Ok(Self {
            host,
            port,
            log_level,
            log_format,
        })
    }

    fn validate(&self) -> Result<(), SentinelError> {
        if self.port == 0 {
            return Err(SentinelError::config(
                "port must be greater than 0",
                "SENTINEL_SERVICE_PORT",
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(SentinelError::config(
                format!(
                    "Invalid log_level '{}'. Must be one of: {}",
                    self.log_level,
                    valid_log_levels.join(", ")
                ),
                "SENTINEL_SERVICE_LOG_LEVEL",
            ));
        }

        Ok(())
    }
}

/// Redis configuration, used for the cross-node bus and the alert cache
///
/// # Environment Variables
///
/// - `SENTINEL_REDIS_URL` (optional): Redis URL (fallback `REDIS_URL`, default: "redis://localhost:6379")
/// - `SENTINEL_REDIS_CONNECTION_TIMEOUT` (optional): Connection timeout in seconds (default: 10)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout duration
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl ConfigLoader for RedisConfig {
    fn from_env() -> Result<Self, SentinelError> {
        let url = std::env::var("SENTINEL_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .unwrap_or_else(|_| RedisConfig::default().url);

        let connection_timeout_secs = parse_env_var("SENTINEL_REDIS_CONNECTION_TIMEOUT", 10u64)?;

        Ok(Self {
            url,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), SentinelError> {
        let parsed = Url::parse(&self.url).map_err(|e| {
            SentinelError::config(format!("Invalid REDIS_URL: {}", e), "SENTINEL_REDIS_URL")
        })?;

        if !matches!(parsed.scheme(), "redis" | "rediss") {
            return Err(SentinelError::config(
                format!("Unsupported Redis scheme '{}'", parsed.scheme()),
                "SENTINEL_REDIS_URL",
            ));
        }

        if self.connection_timeout.as_secs() == 0 {
            return Err(SentinelError::config(
                "connection_timeout must be greater than 0 seconds",
                "SENTINEL_REDIS_CONNECTION_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Kafka consumer configuration for the external event stream
///
/// # Environment Variables
///
/// - `SENTINEL_KAFKA_BROKERS` (optional): Bootstrap servers (fallback `KAFKA_BROKERS`, default: "localhost:9092")
/// - `SENTINEL_KAFKA_TOPICS` (optional): Comma separated topic list
/// - `SENTINEL_KAFKA_GROUP_PREFIX` (optional): Consumer group prefix (default: "realtime-hub")
/// - `SENTINEL_KAFKA_SESSION_TIMEOUT_MS` (optional): Session timeout (default: 6000)
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Bootstrap servers
    pub brokers: String,
    /// Topics consumed by every hub instance
    pub topics: Vec<String>,
    /// Prefix of the per-instance consumer group
    pub group_prefix: String,
    /// Consumer session timeout
    pub session_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topics: vec![
                "disaster-events".to_string(),
                "sensor-data".to_string(),
                "flood-alerts".to_string(),
            ],
            group_prefix: "realtime-hub".to_string(),
            session_timeout: Duration::from_millis(6000),
        }
    }
}

impl KafkaConfig {
    /// Consumer group for one hub instance.
    ///
    /// Each instance gets its own group so every instance sees every record.
    pub fn group_id(&self, node_id: &str) -> String {
        format!("{}-{}", self.group_prefix, node_id)
    }
}

impl ConfigLoader for KafkaConfig {
    fn from_env() -> Result<Self, SentinelError> {
        let defaults = KafkaConfig::default();

        let brokers = std::env::var("SENTINEL_KAFKA_BROKERS")
            .or_else(|_| std::env::var("KAFKA_BROKERS"))
            .unwrap_or(defaults.brokers);

        let topics = std::env::var("SENTINEL_KAFKA_TOPICS")
            .map(|raw| split_list(&raw))
            .unwrap_or(defaults.topics);

        let group_prefix =
            std::env::var("SENTINEL_KAFKA_GROUP_PREFIX").unwrap_or(defaults.group_prefix);

        let session_timeout_ms = parse_env_var("SENTINEL_KAFKA_SESSION_TIMEOUT_MS", 6000u64)?;

        Ok(Self {
            brokers,
            topics,
            group_prefix,
            session_timeout: Duration::from_millis(session_timeout_ms),
        })
    }

    fn validate(&self) -> Result<(), SentinelError> {
        if self.brokers.trim().is_empty() {
            return Err(SentinelError::config(
                "brokers must not be empty",
                "SENTINEL_KAFKA_BROKERS",
            ));
        }

        if self.topics.is_empty() {
            return Err(SentinelError::config(
                "at least one topic must be configured",
                "SENTINEL_KAFKA_TOPICS",
            ));
        }

        if self.group_prefix.trim().is_empty() {
            return Err(SentinelError::config(
                "group_prefix must not be empty",
                "SENTINEL_KAFKA_GROUP_PREFIX",
            ));
        }

        Ok(())
    }
}

/// Split a comma separated list, dropping blank entries
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an environment variable, falling back to `default` when unset
///
/// # Errors
///
/// Returns a `ConfigurationError` if the value is set but cannot be parsed
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T, SentinelError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| SentinelError::config(format!("Failed to parse {}: {}", key, e), key))
        })
        .unwrap_or(Ok(default))
}

/// Load .env file if present
///
/// Missing files are ignored; any other failure is reported on stderr because
/// logging is not initialised yet at this point.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_config_validation_invalid_log_level() {
        let config = ServiceConfig {
            log_level: "verbose".to_string(),
            ..ServiceConfig::default()
        };

        match config.validate().unwrap_err() {
            SentinelError::ConfigurationError { message, key } => {
                assert!(message.contains("Invalid log_level"));
                assert_eq!(key.as_deref(), Some("SENTINEL_SERVICE_LOG_LEVEL"));
            }
            other => panic!("Expected ConfigurationError, got {:?}", other),
        }
    }

    #[test]
    fn test_service_config_ignores_rust_log_directives() {
        env::set_var("RUST_LOG", "info,sentinel_hub=debug");

        let config = ServiceConfig::from_env().unwrap();
        let result = config.validate();

        env::remove_var("RUST_LOG");
        assert_eq!(config.log_level, "info");
        assert!(result.is_ok());
    }

    #[test]
    fn test_service_config_validation_zero_port() {
        let config = ServiceConfig {
            port: 0,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_config_default_is_valid() {
        let config = RedisConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_config_validation_invalid_url() {
        let config = RedisConfig {
            url: "invalid-redis-url".to_string(),
            ..RedisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_config_validation_wrong_scheme() {
        let config = RedisConfig {
            url: "http://localhost:6379".to_string(),
            ..RedisConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.key(), Some("SENTINEL_REDIS_URL"));
    }

    #[test]
    fn test_kafka_config_default() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert!(config.topics.contains(&"flood-alerts".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_kafka_group_id_is_per_node() {
        let config = KafkaConfig::default();
        assert_eq!(config.group_id("node-a"), "realtime-hub-node-a");
        assert_ne!(config.group_id("node-a"), config.group_id("node-b"));
    }

    #[test]
    fn test_kafka_config_rejects_empty_topics() {
        let config = KafkaConfig {
            topics: Vec::new(),
            ..KafkaConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.key(), Some("SENTINEL_KAFKA_TOPICS"));
    }

    #[test]
    fn test_kafka_config_from_env_topics() {
        env::set_var("SENTINEL_KAFKA_TOPICS", "flood-alerts,quake-alerts");
        let config = KafkaConfig::from_env().unwrap();
        assert_eq!(
            config.topics,
            vec!["flood-alerts".to_string(), "quake-alerts".to_string()]
        );
        env::remove_var("SENTINEL_KAFKA_TOPICS");
    }

    #[test]
    fn test_split_list_trims_and_skips_blanks() {
        assert_eq!(
            split_list(" flood-alerts, ,sensor-data ,"),
            vec!["flood-alerts".to_string(), "sensor-data".to_string()]
        );
    }

    #[test]
    fn test_parse_env_var_with_default() {
        let result: u32 = parse_env_var("SENTINEL_TEST_NON_EXISTENT_VAR", 42).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_parse_env_var_with_value() {
        env::set_var("SENTINEL_TEST_PARSE_VAR", "100");
        let result: u32 = parse_env_var("SENTINEL_TEST_PARSE_VAR", 42).unwrap();
        assert_eq!(result, 100);
        env::remove_var("SENTINEL_TEST_PARSE_VAR");
    }

    #[test]
    fn test_parse_env_var_invalid_value() {
        env::set_var("SENTINEL_TEST_INVALID_VAR", "not-a-number");
        let result: Result<u32, _> = parse_env_var("SENTINEL_TEST_INVALID_VAR", 42);
        assert!(result.is_err());
        env::remove_var("SENTINEL_TEST_INVALID_VAR");
    }
}
