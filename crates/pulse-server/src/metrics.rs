//! Prometheus recorder and `/metrics` rendering.

use metrics::{Unit, describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use pulse_core::telemetry;
use tracing::info;

/// Install the global Prometheus recorder and describe the hub's metrics.
///
/// Call once at startup, before the hub records anything. Fails if another
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

fn describe() {
    describe_counter!(telemetry::CONNECTIONS_TOTAL, Unit::Count, "Subscriber connections opened");
    describe_gauge!(telemetry::CONNECTIONS_ACTIVE, Unit::Count, "Live subscriber connections");
    describe_counter!(telemetry::EVICTIONS_TOTAL, Unit::Count, "Connections closed, by reason");
    describe_counter!(
        telemetry::EVENTS_DISPATCHED_TOTAL,
        Unit::Count,
        "Events fanned out, by kind"
    );
    describe_counter!(telemetry::DELIVERIES_TOTAL, Unit::Count, "Events queued to a subscriber");
    describe_counter!(telemetry::SEND_FAILURES_TOTAL, Unit::Count, "Failed or timed out sends");
    describe_counter!(
        telemetry::BRIDGE_CHANGES_TOTAL,
        Unit::Count,
        "External change records forwarded"
    );
    describe_counter!(
        telemetry::BRIDGE_MALFORMED_TOTAL,
        Unit::Count,
        "External change records dropped as malformed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::counter;

    #[test]
    fn local_recorder_renders_hub_counters() {
        // Scoped recorder; the global one is left alone so tests do not race.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            counter!(telemetry::DELIVERIES_TOTAL).increment(3);
        });
        let output = render(&handle);
        assert!(output.contains("pulse_deliveries_total 3"));
    }

    #[test]
    fn empty_recorder_renders_without_panicking() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(!output.contains("pulse_connections_total"));
    }
}
