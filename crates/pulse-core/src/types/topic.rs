//! Subscription topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::event::kinds;
use crate::errors::HubError;

/// The category of events a connection receives.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Ticket change notifications, targeted by correlation id.
    TicketUpdates,
    /// Progress of a data synchronization run (finite).
    SyncProgress,
    /// Progress of a connectivity test over ITSM resources (finite).
    TestProgress,
    /// Periodic aggregate ticket counters.
    DashboardStats,
    /// SLA breach / warning / update alerts.
    SlaMonitoring,
    /// Heartbeat-only channel.
    #[default]
    General,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Topic; 6] = [
        Topic::TicketUpdates,
        Topic::SyncProgress,
        Topic::TestProgress,
        Topic::DashboardStats,
        Topic::SlaMonitoring,
        Topic::General,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::TicketUpdates => "ticket-updates",
            Topic::SyncProgress => "sync-progress",
            Topic::TestProgress => "test-progress",
            Topic::DashboardStats => "dashboard-stats",
            Topic::SlaMonitoring => "sla-monitoring",
            Topic::General => "general",
        }
    }

    /// Event kinds whose history is replayed to a new subscriber of this topic.
    pub fn replay_kinds(self) -> &'static [&'static str] {
        match self {
            Topic::TicketUpdates => &[kinds::TICKET_UPDATED],
            Topic::SyncProgress => &[kinds::SYNC_PROGRESS, kinds::SYNC_COMPLETE],
            Topic::TestProgress => &[kinds::TEST_PROGRESS, kinds::TEST_COMPLETE],
            Topic::DashboardStats => &[kinds::DASHBOARD_STATS],
            Topic::SlaMonitoring => &[kinds::SLA_BREACH, kinds::SLA_WARNING, kinds::SLA_UPDATE],
            Topic::General => &[],
        }
    }

    /// Whether the topic's handler terminates on its own.
    pub fn is_finite(self) -> bool {
        matches!(self, Topic::SyncProgress | Topic::TestProgress)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| HubError::UnknownTopic(s.to_string()))
    }
}
