//! Domain payload shapes. Field names are part of the wire contract.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::topic::Topic;

/// Payload of `ticket-updated`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdate {
    /// Ticket system id (also the correlation id).
    pub sys_id: String,
    /// Human-readable ticket number, e.g. `INC0010001`.
    pub number: String,
    /// Ticket table / type, e.g. `incident`.
    pub ticket_type: String,
    /// What happened (`created`, `updated`, `resolved`, ...).
    pub action: String,
    /// Ticket state after the change.
    pub state: String,
    /// Fields touched by the change.
    pub changed_fields: Vec<String>,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

/// Payload of `sla-breach`, `sla-warning` and `sla-update`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaUpdate {
    /// Ticket the SLA is attached to.
    pub ticket_id: String,
    /// Ticket number.
    pub ticket_number: String,
    /// SLA record id.
    pub sla_id: String,
    /// SLA definition name.
    pub sla_name: String,
    /// Elapsed business time as a percentage of the SLA target.
    pub business_percentage: f64,
    /// Whether the SLA target has been missed.
    pub has_breached: bool,
    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,
}

/// Payload of `dashboard-stats`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    /// All tickets known to the cache.
    pub total_tickets: u64,
    /// Tickets not yet resolved or closed.
    pub active_tickets: u64,
    /// Counts per ticket type.
    pub by_type: BTreeMap<String, u64>,
    /// Counts per state.
    pub by_state: BTreeMap<String, u64>,
    /// When the counters were computed.
    pub last_update: DateTime<Utc>,
}

/// Payload of `sync-progress`, `sync-complete`, `test-progress` and `test-complete`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Operation name (e.g. `full-sync`).
    pub operation: String,
    /// Stage or resource name.
    pub stage: String,
    /// Completion percentage, 0–100.
    pub progress: u8,
    /// One-based index of the stage just finished.
    pub current: usize,
    /// Number of stages.
    pub total: usize,
    /// Human-readable status line.
    pub message: String,
    /// When the stage finished.
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    /// Integer percentage of `current` out of `total`, rounded down and capped at 100.
    pub fn percent(current: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        let pct = (current.min(total) * 100) / total;
        u8::try_from(pct).unwrap_or(100)
    }
}

/// Payload of `connected`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedInfo {
    /// Connection id assigned to the subscriber.
    pub connection_id: String,
    /// Subscribed topic.
    pub topic: Topic,
    /// Correlation id, when the subscription is targeted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Number of history events replayed after this one.
    pub replayed: usize,
}
