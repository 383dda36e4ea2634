//! Error types for the event distribution core.
//!
//! Only registry misuse is returned to callers. Per-connection failures
//! ([`SendError`]) are contained by the hub and turned into evictions; bridge
//! and data-source failures are logged and never abort the loops that hit them.

use thiserror::Error;

/// Registry and lookup errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    /// A connection with this id is already registered.
    #[error("connection id already registered: {0}")]
    DuplicateConnectionId(String),
    /// No live connection with this id.
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),
    /// The topic name is not one of the known subscription topics.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}

/// Failure to push an event into a connection's outbound queue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The sink was closed (subscriber went away or connection already closed).
    #[error("connection sink closed")]
    Closed,
    /// The outbound queue stayed full past the send timeout.
    #[error("send timed out")]
    Timeout,
}

/// External change bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A change record could not be turned into an event.
    #[error("malformed change event: {0}")]
    MalformedChangeEvent(String),
    /// Subscribing to the external change source failed at startup.
    #[error("failed to subscribe to {topic}: {reason}")]
    UpstreamSubscribeFailure {
        /// Topic the bridge tried to subscribe to.
        topic: String,
        /// Reason reported by the source.
        reason: String,
    },
    /// Publishing a change record to the source failed.
    #[error("failed to publish change: {0}")]
    Publish(String),
}

/// Failure of a periodic data source (stats, SLA feed).
#[derive(Debug, Error)]
#[error("{source_name} unavailable: {message}")]
pub struct SourceError {
    /// Which source failed.
    pub source_name: &'static str,
    /// Human-readable cause.
    pub message: String,
}

impl SourceError {
    /// Build a source error.
    pub fn new(source_name: &'static str, message: impl Into<String>) -> Self {
        Self {
            source_name,
            message: message.into(),
        }
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
