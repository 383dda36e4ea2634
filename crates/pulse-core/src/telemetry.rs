//! Metric names recorded by the core through the `metrics` facade.
//!
//! The recorder itself is installed by the server crate.

/// Connections opened total (counter, labels: topic).
pub const CONNECTIONS_TOTAL: &str = "pulse_connections_total";
/// Live connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "pulse_connections_active";
/// Connections closed total (counter, labels: reason).
pub const EVICTIONS_TOTAL: &str = "pulse_evictions_total";
/// Events dispatched through the broadcast engine (counter, labels: kind).
pub const EVENTS_DISPATCHED_TOTAL: &str = "pulse_events_dispatched_total";
/// Events successfully queued to a subscriber (counter).
pub const DELIVERIES_TOTAL: &str = "pulse_deliveries_total";
/// Failed sends (counter, labels: error).
pub const SEND_FAILURES_TOTAL: &str = "pulse_send_failures_total";
/// Change records turned into events by the bridge (counter).
pub const BRIDGE_CHANGES_TOTAL: &str = "pulse_bridge_changes_total";
/// Change records dropped as malformed (counter).
pub const BRIDGE_MALFORMED_TOTAL: &str = "pulse_bridge_malformed_total";

/// Every metric name above.
pub const ALL: [&str; 8] = [
    CONNECTIONS_TOTAL,
    CONNECTIONS_ACTIVE,
    EVICTIONS_TOTAL,
    EVENTS_DISPATCHED_TOTAL,
    DELIVERIES_TOTAL,
    SEND_FAILURES_TOTAL,
    BRIDGE_CHANGES_TOTAL,
    BRIDGE_MALFORMED_TOTAL,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        for name in ALL {
            assert!(name.starts_with("pulse_"), "{name}");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
