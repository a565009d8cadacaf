//! Client errors.

use crate::operation::GraphqlError;
use std::fmt;
use thiserror::Error;

/// What went wrong, independent of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    // Transport
    Network,
    Timeout,
    HttpStatus,
    WebSocket,

    // Protocol
    InvalidResponse,
    Protocol,

    // GraphQL
    Graphql,
    NoData,
    UnsupportedOperation,

    // Serialization
    Serialize,
    Deserialize,

    SubscriptionClosed,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::HttpStatus => "HTTP_STATUS",
            Self::WebSocket => "WEBSOCKET_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Graphql => "GRAPHQL_ERROR",
            Self::NoData => "NO_DATA",
            Self::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Self::Serialize => "SERIALIZE_ERROR",
            Self::Deserialize => "DESERIALIZE_ERROR",
            Self::SubscriptionClosed => "SUBSCRIPTION_CLOSED",
        }
    }

    /// Returns true if sending the same request again may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error executing an operation.
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct ClientError {
    pub code: ErrorCode,
    pub message: String,
    /// Errors reported by the server, for [`ErrorCode::Graphql`].
    pub errors: Vec<GraphqlError>,
}

impl ClientError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "request timed out")
    }

    pub fn websocket(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WebSocket, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Protocol, message)
    }

    pub fn serialize(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Serialize, message)
    }

    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Deserialize, message)
    }

    /// Wraps the errors of a GraphQL response.
    pub fn graphql(errors: Vec<GraphqlError>) -> Self {
        let message = match errors.as_slice() {
            [] => "the server reported an error".to_string(),
            [single] => single.to_string(),
            [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
        };
        Self {
            code: ErrorCode::Graphql,
            message,
            errors,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout()
        } else if error.is_decode() {
            Self::new(ErrorCode::InvalidResponse, error.to_string())
        } else {
            Self::network(error.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::websocket(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_properties() {
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(ErrorCode::Network.is_retryable());
        assert!(!ErrorCode::Graphql.is_retryable());
        assert_eq!(ErrorCode::NoData.to_string(), "NO_DATA");
    }

    #[test]
    fn test_graphql_error_message() {
        let error = ClientError::graphql(vec![
            GraphqlError::new("user not found"),
            GraphqlError::new("forbidden"),
        ]);
        assert_eq!(error.code, ErrorCode::Graphql);
        assert_eq!(error.to_string(), "[GRAPHQL_ERROR] user not found (and 1 more)");
        assert_eq!(error.errors.len(), 2);
    }
}
