//! Passive topics: keep the stream warm while there is nothing to say.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{self, MissedTickBehavior};

use crate::connection::Connection;
use crate::errors::SendError;
use crate::hub::Hub;
use crate::types::{Event, kinds};

fn heartbeat(conn: &Connection) -> Event {
    let mut event = Event::new(kinds::HEARTBEAT, json!({ "connectionId": conn.id }));
    event.correlation_id.clone_from(&conn.correlation_id);
    event
}

/// Heartbeat only when nothing was delivered for a whole `period`.
///
/// Broadcasts and pings push the deadline out, since every successful send
/// refreshes the connection's last-ack time.
pub(super) async fn idle_heartbeat(
    hub: &Hub,
    conn: &Arc<Connection>,
    period: Duration,
) -> Result<(), SendError> {
    loop {
        time::sleep_until(conn.last_ack() + period).await;
        if conn.ack_elapsed() >= period {
            hub.emit(conn, heartbeat(conn)).await?;
        }
    }
}

/// Heartbeat every `period`, regardless of other traffic.
pub(super) async fn fixed_heartbeat(
    hub: &Hub,
    conn: &Arc<Connection>,
    period: Duration,
) -> Result<(), SendError> {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        let _ = ticker.tick().await;
        hub.emit(conn, heartbeat(conn)).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::super::{SubscribeOptions, attach};
    use super::*;
    use crate::broadcast::BroadcastEngine;
    use crate::hub::HubConfig;
    use crate::types::Topic;

    fn config() -> HubConfig {
        HubConfig {
            ticket_heartbeat: Duration::from_secs(5),
            general_heartbeat: Duration::from_secs(30),
            ..HubConfig::default()
        }
    }

    fn assert_secs(start: time::Instant, secs: u64) {
        assert_eq!(start.elapsed().as_secs(), secs);
    }

    #[tokio::test(start_paused = true)]
    async fn general_heartbeats_on_schedule() {
        let ctx = context(config());
        let (_conn, mut rx) = attach(&ctx, None, Topic::General, SubscribeOptions::default()).unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, kinds::CONNECTED);

        let start = time::Instant::now();
        let beat = rx.recv().await.unwrap();
        assert_eq!(beat.kind, kinds::HEARTBEAT);
        assert_secs(start, 30);

        let _ = rx.recv().await.unwrap();
        assert_secs(start, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_heartbeat_when_idle() {
        let ctx = context(config());
        let options = SubscribeOptions {
            correlation_id: Some("T-1".into()),
            ..SubscribeOptions::default()
        };
        let (_conn, mut rx) = attach(&ctx, None, Topic::TicketUpdates, options).unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, kinds::CONNECTED);

        let start = time::Instant::now();
        let beat = rx.recv().await.unwrap();
        assert_eq!(beat.kind, kinds::HEARTBEAT);
        assert_eq!(beat.correlation_id.as_deref(), Some("T-1"));
        assert_secs(start, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_heartbeat_suppressed_by_traffic() {
        let ctx = context(config());
        let engine = BroadcastEngine::new(ctx.hub.clone());
        let options = SubscribeOptions {
            correlation_id: Some("T-1".into()),
            ..SubscribeOptions::default()
        };
        let (_conn, mut rx) = attach(&ctx, None, Topic::TicketUpdates, options).unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, kinds::CONNECTED);

        let start = time::Instant::now();
        time::sleep(Duration::from_secs(3)).await;
        let update = Event::new(kinds::TICKET_UPDATED, json!({})).correlated("T-1");
        assert_eq!(engine.dispatch_to_correlation("T-1", update).await, 1);
        assert_eq!(rx.recv().await.unwrap().kind, kinds::TICKET_UPDATED);

        // The idle window restarts at the update: next heartbeat at 3 + 5.
        let beat = rx.recv().await.unwrap();
        assert_eq!(beat.kind, kinds::HEARTBEAT);
        assert_secs(start, 8);
    }
}
