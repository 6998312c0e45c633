//! Error types for the client crate.

use std::time::Duration;

use thiserror::Error;

/// Error returned by [`Websocket::send`](crate::Websocket::send).
///
/// There is exactly one way a fire-and-forget send can fail locally: the
/// connection was explicitly closed or its retries are exhausted.  This is
/// reported as a value, not a panic — the caller already decided to stop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("websocket is closed")]
    Closed,
}

/// Error returned by [`MoonrakerClient`](crate::MoonrakerClient) calls
/// that await a JSON-RPC response.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying websocket is closed; no request can be delivered.
    #[error("websocket is closed")]
    Closed,
    /// No response arrived within the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Moonraker answered with a JSON-RPC error object.
    #[error("moonraker returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The request could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SendError> for ClientError {
    fn from(error: SendError) -> Self {
        match error {
            SendError::Closed => ClientError::Closed,
        }
    }
}
