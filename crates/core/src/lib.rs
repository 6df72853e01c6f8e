//! # Sentinel Core
//!
//! Shared building blocks for the AI-Sentinel services.
//!
//! ## Modules
//!
//! - `config`: Environment-driven configuration loading and validation
//! - `error`: Shared error type
//! - `observability`: Structured logging initialisation
//! - `retry`: Exponential backoff for bounded retries and unbounded reconnect loops

pub mod config;
pub mod error;
pub mod observability;
pub mod retry;

pub use config::{load_dotenv, ConfigLoader, KafkaConfig, RedisConfig, ServiceConfig};
pub use error::SentinelError;
pub use observability::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, Backoff, RetryPolicy};
