//! Client-side error types.

use thiserror::Error;

/// Construction and configuration failures. These are the only errors that
/// cross the client's public boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid WebSocket endpoint `{url}`: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("invalid value for {key}: `{value}`")]
    InvalidSetting { key: &'static str, value: String },
    #[error("the realtime client must be created inside a tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Failures of the underlying socket. Never surfaced to callers directly:
/// they are logged, emitted as `error` events and drive reconnection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("{0}")]
    Other(String),
}
