//! `dashboard-stats`: periodic aggregate counters.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::warn;

use super::TopicContext;
use crate::connection::Connection;
use crate::errors::SendError;
use crate::types::{Event, kinds};

/// Emit stats right away, then every `period`. Source failures skip a tick.
pub(super) async fn run(
    ctx: &TopicContext,
    conn: &Arc<Connection>,
    period: Duration,
) -> Result<(), SendError> {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let _ = ticker.tick().await;
        match ctx.stats.dashboard_stats().await {
            Ok(stats) => {
                ctx.hub
                    .emit(conn, Event::with_payload(kinds::DASHBOARD_STATS, &stats))
                    .await?;
            }
            Err(err) => warn!(error = %err, "dashboard stats unavailable, skipping tick"),
        }
    }
}
