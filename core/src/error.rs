//! Error types for the fleet API client.
//!
//! # Design
//! Connections report failures as `TransportError`, whatever their cause.
//! The client collapses every transport failure into `FleetError::Connection`
//! at the dispatch boundary, keeping only the message text, so callers have a
//! single variant to match for "the cluster could not be reached." Non-2xx
//! responses get dedicated variants for the statuses the fleet API actually
//! uses (400, 404, 409, 5xx); anything else lands in `UnexpectedStatus`.

use serde::Deserialize;
use thiserror::Error;

/// Errors returned by the client and by configuration access.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The transport failed to complete the request. Carries only the
    /// original failure's message.
    #[error("{0}")]
    Connection(String),

    /// A configuration option name outside the recognized set.
    #[error("unknown configuration option: {0}")]
    UnknownOption(String),

    /// A configuration value of the wrong shape for its option.
    #[error("invalid value for {option}: expected {expected}")]
    InvalidValue {
        option: &'static str,
        expected: &'static str,
    },

    /// Request options that cannot be turned into a request descriptor.
    #[error("invalid request options: {0}")]
    InvalidOptions(String),

    /// The server returned 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The server returned 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server returned 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The server returned a 5xx status.
    #[error("server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// The server returned a non-2xx status with no dedicated variant.
    #[error("unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
}

/// Result alias used throughout the crate.
pub type FleetResult<T> = Result<T, FleetError>;

/// Failure raised by a `Connection` while sending a request.
///
/// The variants only classify the failure for logging; `Display` yields the
/// bare message so it survives normalization unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0}")]
    ConnectionFailed(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::ConnectionFailed(_) => "connection_failed",
            TransportError::Timeout(_) => "timeout",
            TransportError::Other(_) => "other",
        }
    }
}

/// Error envelope returned by the fleet API: `{"error": {"code", "message"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Human-readable message for an error response body: the envelope's
/// `error.message` when present, otherwise the raw body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_displays_bare_message() {
        let err = FleetError::Connection("oops".to_string());
        assert_eq!(err.to_string(), "oops");
    }

    #[test]
    fn transport_error_displays_bare_message() {
        assert_eq!(TransportError::Timeout("timed out".into()).to_string(), "timed out");
        assert_eq!(TransportError::ConnectionFailed("refused".into()).kind(), "connection_failed");
    }

    #[test]
    fn error_message_prefers_envelope() {
        let body = r#"{"error":{"code":404,"message":"unit does not exist"}}"#;
        assert_eq!(error_message(body), "unit does not exist");
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("gateway down"), "gateway down");
        assert_eq!(error_message(r#"{"error":{"code":500}}"#), r#"{"error":{"code":500}}"#);
    }
}
