//! Error types for the envelope codec.

/// Errors raised while encoding or decoding an event envelope.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The body is not valid JSON or does not match the envelope shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The `eventType` (or routing key) is not part of the contract.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A field the consumer needs is absent from the payload.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The timestamp is neither RFC 3339 nor a naive ISO-8601 date-time.
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}
