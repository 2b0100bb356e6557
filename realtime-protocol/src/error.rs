//! Error information carried by protocol messages and surfaced to callers.
//!
//! `ErrorInfo` is the single error value of the channel subsystem: the server
//! sends it inside ERROR / DETACHED / ATTACHED / NACK messages, and the client
//! synthesizes it locally for validation failures and timeouts.

use serde::{Deserialize, Serialize};

/// Numeric error codes used by the channel subsystem.
pub mod codes {
    /// Generic bad request, used for channel options validation.
    pub const BAD_REQUEST: u32 = 40000;
    /// Channel name rejected.
    pub const INVALID_CHANNEL_NAME: u32 = 40010;
    /// Operation requires a client id and none is configured.
    pub const INVALID_CLIENT_ID: u32 = 40012;
    /// Operation not permitted by the granted channel modes or capability.
    pub const OPERATION_NOT_PERMITTED: u32 = 40160;
    /// Generic server-side failure.
    pub const INTERNAL_ERROR: u32 = 50000;
    /// The connection failed.
    pub const CONNECTION_FAILED: u32 = 80000;
    /// The connection is suspended.
    pub const CONNECTION_SUSPENDED: u32 = 80002;
    /// The connection (or the client) has been closed.
    pub const CONNECTION_CLOSED: u32 = 80017;
    /// A channel operation failed or was superseded.
    pub const CHANNEL_OPERATION_FAILED: u32 = 90000;
    /// The operation is not valid in the channel's current state.
    pub const CHANNEL_STATE_INVALID: u32 = 90001;
    /// A request to the server timed out.
    pub const TIMEOUT: u32 = 90007;
}

/// Structured error: numeric code, HTTP-like status code and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message} (code {code}, status {status_code})")]
pub struct ErrorInfo {
    /// Numeric error code (see [`codes`])
    pub code: u32,
    /// HTTP-like status code
    pub status_code: u16,
    /// Human-readable description
    #[serde(default)]
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error from its parts.
    pub fn new(code: u32, status_code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            status_code,
            message: message.into(),
        }
    }

    /// Channel options failed validation.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::new(codes::BAD_REQUEST, 400, message)
    }

    /// Channel name is not valid.
    pub fn invalid_channel_name(name: &str) -> Self {
        Self::new(
            codes::INVALID_CHANNEL_NAME,
            400,
            format!("Invalid channel name: {name:?}"),
        )
    }

    /// A presence operation needs a client id and none was given.
    pub fn missing_client_id() -> Self {
        Self::new(
            codes::INVALID_CLIENT_ID,
            400,
            "Unable to enter presence without a client id",
        )
    }

    /// A request to the server was not answered in time.
    pub fn timeout(operation: &str) -> Self {
        Self::new(codes::TIMEOUT, 408, format!("{operation} timed out"))
    }

    /// The operation is invalid for the channel's current state.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(codes::CHANNEL_STATE_INVALID, 400, message)
    }

    /// A pending channel operation was superseded or abandoned.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(codes::CHANNEL_OPERATION_FAILED, 400, message)
    }

    /// The connection went into the suspended state.
    pub fn connection_suspended() -> Self {
        Self::new(codes::CONNECTION_SUSPENDED, 503, "Connection suspended")
    }

    /// The connection (or the client owning it) was closed.
    pub fn connection_closed() -> Self {
        Self::new(codes::CONNECTION_CLOSED, 400, "Connection closed")
    }

    /// The connection failed.
    pub fn connection_failed() -> Self {
        Self::new(codes::CONNECTION_FAILED, 503, "Connection failed")
    }

    /// Generic server failure, used when the server omits an error body.
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, 500, message)
    }

    /// Whether this error was synthesized for a local timeout.
    pub fn is_timeout(&self) -> bool {
        self.code == codes::TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_display() {
        let error = ErrorInfo::timeout("Channel attach");
        assert_eq!(
            error.to_string(),
            "Channel attach timed out (code 90007, status 408)"
        );
        assert!(error.is_timeout());
    }

    #[test]
    fn test_error_info_deserializes_camel_case() {
        let error: ErrorInfo = serde_json::from_value(serde_json::json!({
            "code": 50000,
            "statusCode": 500,
            "message": "generic serverside failure"
        }))
        .unwrap();

        assert_eq!(error.code, codes::INTERNAL_ERROR);
        assert_eq!(error.status_code, 500);
        assert_eq!(error.message, "generic serverside failure");
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let error = ErrorInfo::invalid_options("modes must be an array");
        assert_eq!(error.code, 40000);
        assert_eq!(error.status_code, 400);

        let error = ErrorInfo::invalid_channel_name(":hell");
        assert_eq!(error.code, 40010);
        assert!(error.message.contains(":hell"));
    }
}
