//! Chat client error types

use std::time::Duration;

use thiserror::Error;

use super::retry::IsRetryable;

/// Failure of a request or an in-flight turn
#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport-level failure (connect, TLS, timeout)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    /// The response body failed after streaming began
    #[error("stream read failed: {0}")]
    StreamRead(String),

    /// Response body did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Another turn is still streaming on this conversation
    #[error("a turn is already in progress")]
    TurnInProgress,

    /// Turn cancelled by the caller
    #[error("request cancelled")]
    Cancelled,
}

impl ChatError {
    /// Text shown in place of the assistant reply when a turn fails
    pub fn user_description(&self) -> String {
        match self {
            ChatError::Status { status, body, .. } if !body.trim().is_empty() => {
                format!("Error {}: {}", status, body.trim())
            }
            ChatError::Status { status, .. } => format!(
                "Error {}: {}",
                status,
                crate::constants::transcript::GENERIC_ERROR
            ),
            ChatError::Cancelled => crate::constants::transcript::CANCELLED.to_string(),
            other => format!("Error: {}", other),
        }
    }
}

impl IsRetryable for ChatError {
    fn is_retryable(&self) -> bool {
        match self {
            ChatError::Status { status, .. } => super::retry::is_retryable_status(*status),
            ChatError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ChatError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Failure to turn a decoded record into a [`ChatEvent`](super::events::ChatEvent)
///
/// Always recovered locally: the record is dropped and the stream continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not JSON, or not the shape the event expects
    #[error("payload for '{event}' is not valid: {source}")]
    Json {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// A field the event cannot do without is absent or null
    #[error("payload for '{event}' is missing '{field}'")]
    MissingField { event: String, field: &'static str },

    /// Embedded chart specification string is not JSON
    #[error("chart spec could not be parsed: {0}")]
    ChartSpec(#[source] serde_json::Error),
}
