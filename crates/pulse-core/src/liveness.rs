//! Liveness supervisor: pings idle subscribers and evicts stale ones.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::connection::Connection;
use crate::hub::{CloseReason, Hub};
use crate::types::{Event, kinds};

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Connections that received a ping.
    pub pinged: usize,
    /// Connections evicted (stale or failed ping).
    pub evicted: usize,
}

enum Ping {
    Sent,
    Evicted,
    AlreadyClosed,
}

/// Periodically checks every registered connection.
pub struct LivenessSupervisor {
    hub: Arc<Hub>,
}

impl LivenessSupervisor {
    /// Create a supervisor over `hub`.
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Run one pass.
    ///
    /// A connection whose last acknowledgement is strictly older than the
    /// stale threshold is evicted; every other connection is pinged, and a
    /// failed ping evicts it too. Only closes made by this sweep are counted.
    pub async fn sweep(&self) -> SweepReport {
        let threshold = self.hub.config().stale_threshold;
        let mut report = SweepReport::default();
        let mut to_ping: Vec<Arc<Connection>> = Vec::new();

        for conn in self.hub.registry().list() {
            if conn.ack_elapsed() > threshold {
                if self.hub.close(&conn, CloseReason::Stale) {
                    report.evicted += 1;
                    info!(conn_id = %conn.id, "evicted stale connection");
                }
            } else {
                to_ping.push(conn);
            }
        }

        let results = join_all(to_ping.iter().map(|conn| async move {
            let ping = Event::new(kinds::PING, json!({ "connectionId": conn.id }));
            let ping = Arc::new(self.hub.stamp(ping));
            match self.hub.try_deliver(conn, ping).await {
                Ok(()) => Ping::Sent,
                Err(err) => {
                    if self.hub.close(conn, CloseReason::SendFailure) {
                        info!(conn_id = %conn.id, error = %err, "ping failed, connection evicted");
                        Ping::Evicted
                    } else {
                        Ping::AlreadyClosed
                    }
                }
            }
        }))
        .await;
        for result in results {
            match result {
                Ping::Sent => report.pinged += 1,
                Ping::Evicted => report.evicted += 1,
                Ping::AlreadyClosed => {}
            }
        }
        report
    }

    /// Sweep every liveness period until `cancel` fires.
    #[instrument(skip_all, name = "liveness_supervisor")]
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.hub.config().liveness_period;
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "liveness supervisor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    debug!(pinged = report.pinged, evicted = report.evicted, "liveness sweep");
                }
                () = cancel.cancelled() => {
                    info!("liveness supervisor stopped");
                    return;
                }
            }
        }
    }
}
