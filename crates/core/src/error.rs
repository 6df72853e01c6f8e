//! Shared error type for Sentinel services

use thiserror::Error;

/// Errors raised by the shared core layer
#[derive(Debug, Error)]
pub enum SentinelError {
    /// A configuration value is missing, unparseable or out of range
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        /// Environment variable the error refers to, when known
        key: Option<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SentinelError {
    /// Shorthand for a configuration error bound to an environment key
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        SentinelError::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Environment key associated with a configuration error
    pub fn key(&self) -> Option<&str> {
        match self {
            SentinelError::ConfigurationError { key, .. } => key.as_deref(),
            SentinelError::Internal(_) => None,
        }
    }
}
