use thiserror::Error;

use crate::{ConsumerGroup, Topic};

/// Errors raised by the bus and the publisher.
#[derive(Debug, Error)]
pub enum BusError {
    /// The transport refused the record; the caller keeps it for a later attempt.
    #[error("Event bus unavailable")]
    Unavailable,

    /// A second handler was registered for the same topic and consumer group.
    #[error("Handler already registered for topic {topic} in group {group}")]
    DuplicateSubscription { topic: Topic, group: ConsumerGroup },

    /// Local listeners may only be installed once.
    #[error("Local listeners already installed for {0}")]
    ListenersAlreadyInstalled(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by event handlers.
///
/// Any handler error leaves the record uncommitted so that it is redelivered.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A failure expected to clear on redelivery (contention, unavailable store).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The event could not be applied.
    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
