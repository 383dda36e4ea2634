//! Server configuration derived from settings.

use std::time::Duration;

use pulse_core::HubConfig;
use pulse_settings::{RealtimeSettings, ServerSettings};

/// HTTP listener configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` for an ephemeral port).
    pub port: u16,
    /// How long shutdown waits for background tasks.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Build from the `server` settings section.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            shutdown_timeout: Duration::from_secs(settings.shutdown_timeout_secs),
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

/// Translate the `realtime` settings section into hub tunables.
pub fn hub_config(settings: &RealtimeSettings) -> HubConfig {
    HubConfig {
        history_capacity: settings.history_capacity,
        queue_capacity: settings.queue_capacity,
        send_timeout: Duration::from_millis(settings.send_timeout_ms),
        liveness_period: Duration::from_secs(settings.liveness_period_secs),
        stale_threshold: Duration::from_secs(settings.stale_threshold_secs),
        ticket_heartbeat: Duration::from_secs(settings.ticket_heartbeat_secs),
        general_heartbeat: Duration::from_secs(settings.general_heartbeat_secs),
        dashboard_interval: Duration::from_secs(settings.dashboard_interval_secs),
        progress_step: Duration::from_secs(settings.progress_step_secs),
        sla_interval: Duration::from_secs(settings.sla_interval_secs),
        sla_warning_percent: settings.sla_warning_percent,
        default_max_history: settings.default_max_history,
    }
}
