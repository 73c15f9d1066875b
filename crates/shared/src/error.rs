//! Shared error types.

use thiserror::Error;

/// Failure to turn a text frame into a typed event, or an outbound value
/// into text.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no `type` field")]
    MissingType,
    #[error("frame `type` is not a string")]
    InvalidType,
    #[error("invalid payload for `{kind}`: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
