//! Event distribution tunables.

use serde::{Deserialize, Serialize};

/// Registry, history, handler and liveness settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Events retained per kind for replay.
    pub history_capacity: usize,
    /// Outbound queue capacity per connection.
    pub queue_capacity: usize,
    /// Per-send timeout in milliseconds; a slower subscriber is evicted.
    pub send_timeout_ms: u64,
    /// Liveness sweep period in seconds.
    pub liveness_period_secs: u64,
    /// Idle time after which a connection is evicted, in seconds.
    pub stale_threshold_secs: u64,
    /// Idle heartbeat period for `ticket-updates`, in seconds.
    pub ticket_heartbeat_secs: u64,
    /// Heartbeat period for `general`, in seconds.
    pub general_heartbeat_secs: u64,
    /// Default `dashboard-stats` period, in seconds.
    pub dashboard_interval_secs: u64,
    /// Default delay between progress steps, in seconds.
    pub progress_step_secs: u64,
    /// Default `sla-monitoring` polling period, in seconds.
    pub sla_interval_secs: u64,
    /// Business percentage at or above which an SLA is reported as a warning.
    pub sla_warning_percent: f64,
    /// History events replayed to a new subscriber by default.
    pub default_max_history: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            queue_capacity: 256,
            send_timeout_ms: 2000,
            liveness_period_secs: 15,
            stale_threshold_secs: 30,
            ticket_heartbeat_secs: 5,
            general_heartbeat_secs: 30,
            dashboard_interval_secs: 30,
            progress_step_secs: 1,
            sla_interval_secs: 8,
            sla_warning_percent: 75.0,
            default_max_history: 10,
        }
    }
}
