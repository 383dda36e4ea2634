//! `/health` endpoint.

use std::time::Instant;

use pulse_core::BridgeStatus;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live subscriber connections.
    pub connections: usize,
    /// Change bridge state; `None` when no bridge was started.
    pub bridge: Option<BridgeStatus>,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, bridge: Option<BridgeStatus>) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        bridge,
    }
}
