//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

mod realtime;
mod server;

pub use realtime::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "realtime": { "staleThresholdSecs": 60 },
///   "logging": { "level": "debug", "json": true }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseSettings {
    /// Settings schema version.
    pub version: String,
    /// HTTP listener.
    pub server: ServerSettings,
    /// Event distribution tunables.
    pub realtime: RealtimeSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for PulseSettings {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            server: ServerSettings::default(),
            realtime: RealtimeSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PulseSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rt = &self.realtime;
        let positive = [
            ("realtime.queueCapacity", u64::try_from(rt.queue_capacity).unwrap_or(u64::MAX)),
            ("realtime.sendTimeoutMs", rt.send_timeout_ms),
            ("realtime.livenessPeriodSecs", rt.liveness_period_secs),
            ("realtime.staleThresholdSecs", rt.stale_threshold_secs),
            ("realtime.ticketHeartbeatSecs", rt.ticket_heartbeat_secs),
            ("realtime.generalHeartbeatSecs", rt.general_heartbeat_secs),
            ("realtime.dashboardIntervalSecs", rt.dashboard_interval_secs),
            ("realtime.slaIntervalSecs", rt.sla_interval_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(SettingsError::InvalidValue(format!("{key} must be greater than zero")));
        }
        if !(0.0..=100.0).contains(&rt.sla_warning_percent) {
            return Err(SettingsError::InvalidValue(format!(
                "realtime.slaWarningPercent must be within 0..=100, got {}",
                rt.sla_warning_percent
            )));
        }
        Ok(())
    }
}
