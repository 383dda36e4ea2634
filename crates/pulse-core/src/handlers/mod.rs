//! Per-connection topic handlers.
//!
//! `connected` and the history replay are queued before the connection is
//! registered, so nothing broadcast afterwards can overtake them. Every
//! connection then gets one tokio task running the topic's emission loop until
//! it finishes (finite topics), a send fails, or the connection is cancelled.
//! Whatever ends the loop, the connection is closed on the way out.

mod dashboard;
mod heartbeat;
mod progress;
mod sla;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};

use crate::connection::{Connection, Filters};
use crate::errors::{Result, SendError};
use crate::hub::{CloseReason, ConnectionSpec, Hub};
use crate::sources::{SharedStats, SlaFeed, SlaSource, StatsSource};
use crate::types::{ConnectedInfo, Event, Topic, kinds};

pub use progress::{DEFAULT_RESOURCES, DEFAULT_SYNC_STAGES};
pub use sla::classify;

/// Lifecycle of a topic handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
    /// Spawned; the emission loop has not started yet.
    Starting,
    /// Running the topic's emission loop.
    Emitting,
    /// Loop ended; closing the connection.
    Closing,
    /// Done.
    Terminated,
}

/// Shared collaborators handed to every handler.
#[derive(Clone)]
pub struct TopicContext {
    /// The hub.
    pub hub: Arc<Hub>,
    /// Source for `dashboard-stats`.
    pub stats: Arc<dyn StatsSource>,
    /// Source for `sla-monitoring`.
    pub sla: Arc<dyn SlaSource>,
}

impl TopicContext {
    /// Context with explicit sources.
    pub fn new(hub: Arc<Hub>, stats: Arc<dyn StatsSource>, sla: Arc<dyn SlaSource>) -> Self {
        Self { hub, stats, sla }
    }

    /// Context backed by fresh in-memory sources.
    pub fn in_memory(hub: Arc<Hub>) -> Self {
        Self::new(hub, Arc::new(SharedStats::new()), Arc::new(SlaFeed::default()))
    }
}

/// Per-subscription options.
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    /// Topic-specific filters.
    pub filters: Filters,
    /// History events to replay after `connected`; hub default when `None`.
    pub max_history: Option<usize>,
    /// Entity to follow.
    pub correlation_id: Option<String>,
    /// Override of the topic's emission period, in seconds.
    pub interval_secs: Option<u64>,
}

/// Open a connection for `topic` and start its handler.
///
/// Returns the connection and the receiving end of its outbound queue; the
/// transport adapter is the single consumer of that receiver.
pub fn attach(
    ctx: &TopicContext,
    subscriber_id: Option<String>,
    topic: Topic,
    options: SubscribeOptions,
) -> Result<(Arc<Connection>, mpsc::Receiver<Arc<Event>>)> {
    let spec = ConnectionSpec {
        id: subscriber_id,
        topic,
        correlation_id: options.correlation_id.clone(),
        filters: options.filters.clone(),
    };
    let max_history = options
        .max_history
        .unwrap_or(ctx.hub.config().default_max_history);
    let (conn, rx) = ctx
        .hub
        .open_primed(spec, |hub, conn| preamble(hub, conn, max_history))?;
    let _ = spawn_handler(ctx.clone(), conn.clone(), &options);
    Ok((conn, rx))
}

/// `connected` followed by the replay. The oldest replayed events give way when the queue is too small.
fn preamble(hub: &Hub, conn: &Connection, max_history: usize) -> Vec<Arc<Event>> {
    let room = hub.config().queue_capacity.max(1) - 1;
    let mut replay: Vec<Arc<Event>> = hub
        .history()
        .recent(conn.topic.replay_kinds(), max_history)
        .into_iter()
        .filter(|e| replayable(conn, e))
        .collect();
    if replay.len() > room {
        replay = replay.split_off(replay.len() - room);
    }

    let info = ConnectedInfo {
        connection_id: conn.id.clone(),
        topic: conn.topic,
        correlation_id: conn.correlation_id.clone(),
        replayed: replay.len(),
    };
    let mut connected = Event::with_payload(kinds::CONNECTED, &info);
    connected.correlation_id.clone_from(&conn.correlation_id);

    let mut events = Vec::with_capacity(replay.len() + 1);
    events.push(Arc::new(hub.stamp(connected)));
    events.extend(replay);
    events
}

/// Targeted history is only replayed to the entity it targets.
fn replayable(conn: &Connection, event: &Event) -> bool {
    if !conn.accepts(event) {
        return false;
    }
    match (&event.correlation_id, &conn.correlation_id) {
        (Some(target), Some(mine)) => target == mine,
        (Some(_), None) => conn.topic != Topic::TicketUpdates,
        (None, _) => true,
    }
}

/// Spawn the handler task for an already registered connection.
pub fn spawn_handler(ctx: TopicContext, conn: Arc<Connection>, options: &SubscribeOptions) -> JoinHandle<CloseReason> {
    let handler = TopicHandler::new(ctx, conn, options);
    let span = info_span!("topic_handler", conn_id = %handler.conn.id, topic = %handler.conn.topic);
    tokio::spawn(handler.run().instrument(span))
}

/// Drives one connection through its lifecycle.
pub struct TopicHandler {
    ctx: TopicContext,
    conn: Arc<Connection>,
    interval: Option<Duration>,
    sla_cursor: u64,
    state: Arc<Mutex<HandlerState>>,
}

impl TopicHandler {
    /// Build a handler in the `Starting` state.
    ///
    /// An `sla-monitoring` handler sees records added from this point on.
    pub fn new(ctx: TopicContext, conn: Arc<Connection>, options: &SubscribeOptions) -> Self {
        let sla_cursor = if conn.topic == Topic::SlaMonitoring {
            ctx.sla.head()
        } else {
            0
        };
        Self {
            interval: options
                .interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            sla_cursor,
            ctx,
            conn,
            state: Arc::new(Mutex::new(HandlerState::Starting)),
        }
    }

    /// Shared view of the handler's state.
    pub fn state_handle(&self) -> Arc<Mutex<HandlerState>> {
        self.state.clone()
    }

    /// Run to completion. Returns the reason the connection was closed with,
    /// which is whichever close got there first.
    pub async fn run(self) -> CloseReason {
        let cancel = self.conn.cancellation();
        let reason = tokio::select! {
            () = cancel.cancelled() => CloseReason::Client,
            outcome = self.drive() => match outcome {
                Ok(()) => CloseReason::Completed,
                Err(_) => CloseReason::SendFailure,
            },
        };

        self.set_state(HandlerState::Closing);
        let _ = self.ctx.hub.close(&self.conn, reason);
        let reason = self.conn.close_reason().unwrap_or(reason);
        self.set_state(HandlerState::Terminated);
        debug!(reason = reason.as_str(), "handler terminated");
        reason
    }

    async fn drive(&self) -> std::result::Result<(), SendError> {
        self.set_state(HandlerState::Emitting);
        match self.conn.topic {
            Topic::TicketUpdates => {
                let period = self.interval.unwrap_or(self.ctx.hub.config().ticket_heartbeat);
                heartbeat::idle_heartbeat(&self.ctx.hub, &self.conn, period).await
            }
            Topic::General => {
                let period = self.interval.unwrap_or(self.ctx.hub.config().general_heartbeat);
                heartbeat::fixed_heartbeat(&self.ctx.hub, &self.conn, period).await
            }
            Topic::DashboardStats => {
                let period = self.interval.unwrap_or(self.ctx.hub.config().dashboard_interval);
                dashboard::run(&self.ctx, &self.conn, period).await
            }
            Topic::SlaMonitoring => {
                let period = self.interval.unwrap_or(self.ctx.hub.config().sla_interval);
                sla::run(&self.ctx, &self.conn, period, self.sla_cursor).await
            }
            Topic::SyncProgress => {
                let step = self.interval.unwrap_or(self.ctx.hub.config().progress_step);
                progress::sync(&self.ctx.hub, &self.conn, step).await
            }
            Topic::TestProgress => {
                let step = self.interval.unwrap_or(self.ctx.hub.config().progress_step);
                progress::test(&self.ctx.hub, &self.conn, step).await
            }
        }
    }

    fn set_state(&self, state: HandlerState) {
        *self.state.lock() = state;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::hub::HubConfig;

    pub(crate) fn context(config: HubConfig) -> TopicContext {
        TopicContext::in_memory(Arc::new(Hub::new(config)))
    }

    /// Collect events until the queue closes or `limit` events arrived.
    pub(crate) async fn collect(rx: &mut mpsc::Receiver<Arc<Event>>, limit: usize) -> Vec<Arc<Event>> {
        let mut events = Vec::new();
        while events.len() < limit {
            match rx.recv().await {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }
}
