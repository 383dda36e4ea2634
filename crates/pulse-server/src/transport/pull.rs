//! Pull transport: a subscription consumed as a [`Stream`] of events.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::Stream;
use pulse_core::{CloseReason, Connection, Event, Hub, SubscribeOptions, Topic, TopicContext, attach};
use tokio::sync::mpsc;
use tracing::debug;

use super::{StreamQuery, event_stream};
use crate::error::ApiError;
use crate::server::AppState;

/// A live subscription.
///
/// Yields `connected`, the replayed history, then the topic's events. Ends
/// when the connection closes: for progress topics after the completion
/// event, otherwise on eviction or shutdown. Dropping it closes the
/// connection.
pub struct Subscription {
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    rx: mpsc::Receiver<Arc<Event>>,
}

impl Subscription {
    /// The underlying connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Connection id.
    pub fn id(&self) -> &str {
        &self.conn.id
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx
            .poll_recv(cx)
            .map(|event| event.map(Arc::unwrap_or_clone))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.hub.close(&self.conn, CloseReason::Client) {
            debug!(conn_id = %self.conn.id, "subscription dropped");
        }
    }
}

/// Open a subscription to `topic`.
pub fn subscribe(
    ctx: &TopicContext,
    subscriber_id: Option<String>,
    topic: Topic,
    options: SubscribeOptions,
) -> pulse_core::Result<Subscription> {
    let (conn, rx) = attach(ctx, subscriber_id, topic, options)?;
    Ok(Subscription {
        hub: ctx.hub.clone(),
        conn,
        rx,
    })
}

/// `GET /api/events/{topic}`
pub async fn topic_stream(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let topic: Topic = topic.parse()?;
    let (subscriber_id, options) = query.into_options();
    let subscription = subscribe(&state.ctx, subscriber_id, topic, options)?;
    Ok(event_stream(subscription))
}
