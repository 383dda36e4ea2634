//! Broadcast engine: fan-out of one event to a matching set of connections.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use tracing::debug;

use crate::connection::Connection;
use crate::hub::Hub;
use crate::registry::ConnectionRegistry;
use crate::telemetry;
use crate::types::{Event, Topic};

/// Dispatches events to live connections and records them in history.
#[derive(Clone)]
pub struct BroadcastEngine {
    hub: Arc<Hub>,
}

impl BroadcastEngine {
    /// Create an engine over `hub`.
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// The underlying hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Deliver `event` to every live connection for which `match_fn` is true.
    ///
    /// Returns the number of successful deliveries. Connections whose send
    /// fails are evicted; zero matches is not an error.
    pub async fn dispatch<F>(&self, event: Event, match_fn: F) -> usize
    where
        F: Fn(&Connection) -> bool,
    {
        self.fan_out(event, |registry, _| {
            registry
                .list()
                .into_iter()
                .filter(|c| c.is_alive() && match_fn(c))
                .collect()
        })
        .await
    }

    /// Deliver to connections following `correlation_id`.
    pub async fn dispatch_to_correlation(&self, correlation_id: &str, event: Event) -> usize {
        self.fan_out(event, |registry, _| registry.list_by_correlation(correlation_id))
            .await
    }

    /// Deliver to subscribers of `topic` whose filters accept the event.
    pub async fn dispatch_to_topic(&self, topic: Topic, event: Event) -> usize {
        self.fan_out(event, |registry, event| {
            registry
                .list_by_topic(topic)
                .into_iter()
                .filter(|c| c.accepts(event))
                .collect()
        })
        .await
    }

    /// Deliver to every live connection.
    pub async fn broadcast_all(&self, event: Event) -> usize {
        self.dispatch(event, |_| true).await
    }

    async fn fan_out<F>(&self, event: Event, select: F) -> usize
    where
        F: FnOnce(&ConnectionRegistry, &Event) -> Vec<Arc<Connection>>,
    {
        let (event, targets) = self.hub.publish(event, select);
        counter!(telemetry::EVENTS_DISPATCHED_TOTAL, "kind" => event.kind.clone()).increment(1);

        let matched = targets.len();
        let results = join_all(
            targets
                .iter()
                .filter(|c| c.is_alive())
                .map(|conn| self.hub.deliver(conn, event.clone())),
        )
        .await;
        let delivered = results.iter().filter(|r| r.is_ok()).count();

        debug!(
            kind = %event.kind,
            id = event.id.as_deref().unwrap_or(""),
            matched,
            delivered,
            "event dispatched"
        );
        delivered
    }
}
