//! The event envelope delivered to subscribers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kind discriminants.
pub mod kinds {
    /// First event on every connection.
    pub const CONNECTED: &str = "connected";
    /// Idle keep-alive emitted by passive topics.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Liveness probe sent by the supervisor.
    pub const PING: &str = "ping";
    /// A ticket changed.
    pub const TICKET_UPDATED: &str = "ticket-updated";
    /// Aggregate dashboard counters.
    pub const DASHBOARD_STATS: &str = "dashboard-stats";
    /// One sync stage finished.
    pub const SYNC_PROGRESS: &str = "sync-progress";
    /// Sync run finished.
    pub const SYNC_COMPLETE: &str = "sync-complete";
    /// SLA breached.
    pub const SLA_BREACH: &str = "sla-breach";
    /// SLA close to breaching.
    pub const SLA_WARNING: &str = "sla-warning";
    /// SLA progress update.
    pub const SLA_UPDATE: &str = "sla-update";
    /// One resource test finished.
    pub const TEST_PROGRESS: &str = "test-progress";
    /// Resource test run finished.
    pub const TEST_COMPLETE: &str = "test-complete";
}

/// An event as delivered on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Kind discriminant (see [`kinds`]).
    #[serde(rename = "type")]
    pub kind: String,
    /// Sequence id assigned by the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Entity this event concerns, used for targeted broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            correlation_id: None,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Create an event from a serializable payload.
    pub fn with_payload<T: Serialize>(kind: impl Into<String>, payload: &T) -> Self {
        Self::new(kind, serde_json::to_value(payload).unwrap_or_default())
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Decode the payload into a typed shape.
    pub fn payload<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.data.clone()).ok()
    }

    /// Numeric sequence parsed from the id, if the hub assigned one.
    pub fn sequence(&self) -> Option<u64> {
        self.id.as_deref().and_then(|id| id.parse().ok())
    }
}
