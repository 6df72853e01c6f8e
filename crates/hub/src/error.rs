//! Hub error taxonomy
//!
//! Every variant is local to one message or one connection; nothing here is
//! fatal to the process.

use crate::registry::ConnectionId;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use sentinel_core::SentinelError;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Operation referenced a connection that is not registered
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// A stream record or bus message could not be parsed
    #[error("Malformed upstream message from {origin}: {reason}")]
    MalformedUpstream { origin: String, reason: String },

    /// A send to one connection failed; other connections are unaffected
    #[error("Delivery to connection {connection} failed: {reason}")]
    TransientDeliveryFailure {
        connection: ConnectionId,
        reason: String,
    },

    /// Stream or bus connection lost; the hub keeps serving in degraded mode
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Alert cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Configuration(#[from] SentinelError),
}

impl HubError {
    pub fn malformed(origin: impl Into<String>, reason: impl ToString) -> Self {
        HubError::MalformedUpstream {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}

impl ResponseError for HubError {
    fn status_code(&self) -> StatusCode {
        match self {
            HubError::InvalidRequest(_) | HubError::MalformedUpstream { .. } => {
                StatusCode::BAD_REQUEST
            }
            HubError::UnknownConnection(_) => StatusCode::NOT_FOUND,
            HubError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
