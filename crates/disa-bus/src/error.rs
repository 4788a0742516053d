//! Error types for bus operations and consumer reactions.

use disa_events::CodecError;

/// Errors raised by a bus backend.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The broker cannot be reached.
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    /// Failed to communicate with the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// The envelope could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Subscribing to a queue that was never declared.
    #[error("queue not declared: {0}")]
    QueueNotDeclared(String),

    /// The in-memory backend allows one consumer per queue.
    #[error("queue already has a consumer: {0}")]
    AlreadyConsumed(String),

    /// The backend cannot express this routing pattern.
    #[error("unsupported routing pattern: {0}")]
    UnsupportedPattern(String),
}

/// Why a consumer's reaction to one message failed.
///
/// A reaction failure never stops the listener: the message is logged,
/// acknowledged, and optionally dead-lettered.
#[derive(Debug, thiserror::Error)]
pub enum ReactionError {
    /// A payload field the reaction needs is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The queue delivered an event type this reaction does not handle.
    #[error("unexpected event type: {0}")]
    Unexpected(String),

    /// The reaction's own domain logic failed.
    #[error("reaction failed: {0}")]
    Failed(String),
}

impl From<CodecError> for ReactionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MissingField(field) => Self::MissingField(field),
            other => Self::Failed(other.to_string()),
        }
    }
}
